//! Locale helpers: language codes, Jalali calendar and localized dates.

use crate::state::StateStore;
use crate::types::SubscriberId;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use interfaces::defs::LocaleResolver;
use tracing::warn;

const JALALI_MONTHS: [&str; 12] = [
    "فروردین", "اردیبهشت", "خرداد", "تیر", "مرداد", "شهریور", "مهر", "آبان", "آذر", "دی", "بهمن", "اسفند",
];

/// `"fa-IR"` -> `"fa"`.
pub fn base_language(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

pub fn uses_jalali(locale: &str) -> bool {
    base_language(locale) == "fa"
}

/// Gregorian date to Jalali (solar hijri) `(year, month, day)`.
pub fn gregorian_to_jalali(gy: i32, gm: u32, gd: u32) -> (i32, u32, u32) {
    const MONTH_OFFSETS: [i32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
    let gy2 = if gm > 2 { gy + 1 } else { gy };
    let mut days = 355_666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400
        + gd as i32
        + MONTH_OFFSETS[(gm as usize).clamp(1, 12) - 1];
    let mut jy = -1595 + 33 * (days / 12_053);
    days %= 12_053;
    jy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        jy += (days - 1) / 365;
        days = (days - 1) % 365;
    }
    let (jm, jd) = if days < 186 {
        (1 + days / 31, 1 + days % 31)
    } else {
        (7 + (days - 186) / 30, 1 + (days - 186) % 30)
    };
    (jy, jm as u32, jd as u32)
}

pub fn persian_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) if c.is_ascii_digit() => char::from_u32(0x06F0 + d).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Short date for message headers: `2024-03-20`, or `۱ فروردین ۱۴۰۳` for Persian.
pub fn format_date(at: DateTime<Utc>, locale: &str) -> String {
    if uses_jalali(locale) {
        let (y, m, d) = gregorian_to_jalali(at.year(), at.month(), at.day());
        let month = JALALI_MONTHS[(m as usize).clamp(1, 12) - 1];
        persian_digits(&format!("{} {} {}", d, month, y))
    } else {
        at.format("%Y-%m-%d").to_string()
    }
}

/// Long date used by digest headers: `20 March 2024`.
pub fn format_long_date(at: DateTime<Utc>, locale: &str) -> String {
    if uses_jalali(locale) {
        format_date(at, locale)
    } else {
        at.format("%d %B %Y").to_string()
    }
}

/// Coarse "3h ago" style age.
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>, locale: &str) -> String {
    let minutes = now.signed_duration_since(at).num_minutes().max(0);
    let (value, unit_en, unit_fa) = if minutes < 60 {
        (minutes, "m", "دقیقه")
    } else if minutes < 60 * 24 {
        (minutes / 60, "h", "ساعت")
    } else {
        (minutes / (60 * 24), "d", "روز")
    };
    if uses_jalali(locale) {
        persian_digits(&format!("{} {} پیش", value, unit_fa))
    } else {
        format!("{}{} ago", value, unit_en)
    }
}

/// Reads the locale stored on the subscriber row.
pub struct StoreLocaleResolver {
    store: StateStore,
    default_locale: String,
}

impl StoreLocaleResolver {
    pub fn new(store: StateStore, default_locale: impl Into<String>) -> Self {
        Self {
            store,
            default_locale: default_locale.into(),
        }
    }
}

#[async_trait]
impl LocaleResolver for StoreLocaleResolver {
    async fn resolve(&self, subscriber_id: SubscriberId) -> String {
        match self.store.get_subscriber(subscriber_id).await {
            Ok(Some(subscriber)) if !subscriber.locale.trim().is_empty() => subscriber.locale,
            Ok(_) => self.default_locale.clone(),
            Err(e) => {
                warn!("Locale lookup failed for {}: {}", subscriber_id, e);
                self.default_locale.clone()
            }
        }
    }
}
