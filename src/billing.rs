// billing.rs
// Billing calendar and invoice lifecycle rules. No I/O here; state::invoices applies them.

use chrono::{Datelike, Months, NaiveDate, TimeDelta};
use std::{fmt, str::FromStr};

use crate::{error::BillingError, models::InvoiceStatus};

/// Billing period, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, BillingError> {
        if !(1..=12).contains(&month) || !(1970..=9999).contains(&year) {
            return Err(BillingError::InvalidPeriod(format!("{year:04}-{month:02}")));
        }
        Ok(Period { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Period {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        end_of_month(self.first_day())
    }

    /// Day `due_day` of the period, clamped to the month length.
    pub fn due_date(&self, due_day: u32) -> NaiveDate {
        let day = clamp_day(self.year, self.month, due_day);
        NaiveDate::from_ymd_opt(self.year, self.month, day).unwrap_or_else(|| self.last_day())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BillingError::InvalidPeriod(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let digits = |part: &str, len: usize| part.len() == len && part.chars().all(|c| c.is_ascii_digit());
        if !digits(year, 4) || !digits(month, 2) {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Period::new(year, month).map_err(|_| invalid())
    }
}

pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Due date of an invoice issued on `issued_on`: the period's due day, or `grace_days`
/// after issue when that day is already behind.
pub fn invoice_due_date(period: &Period, due_day: u32, issued_on: NaiveDate, grace_days: i64) -> NaiveDate {
    let due = period.due_date(due_day);
    if due < issued_on {
        add_days(issued_on, grace_days)
    } else {
        due
    }
}

/// `date` shifted by `days`, saturating at the calendar bounds.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(TimeDelta::try_days(days).unwrap_or(TimeDelta::MAX))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// Expiration granted by a payment: last day of the month following `paid_on`.
pub fn end_of_next_month(paid_on: NaiveDate) -> NaiveDate {
    let first = paid_on.with_day(1).unwrap_or(paid_on);
    first
        .checked_add_months(Months::new(1))
        .map(end_of_month)
        .unwrap_or(paid_on)
}

/// Total billed for a frozen member count, rounded to cents.
pub fn invoice_total(member_count: i64, unit_price: f64) -> f64 {
    round_cents(member_count as f64 * unit_price)
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A pending invoice is overdue once its due date is strictly before `today`.
pub fn is_overdue(status: InvoiceStatus, due_date: NaiveDate, today: NaiveDate) -> bool {
    status == InvoiceStatus::Pending && due_date < today
}

/// Whether a reminder should go out for an invoice due on `due_date`.
pub fn within_reminder_window(due_date: NaiveDate, today: NaiveDate, days: i64) -> bool {
    let remaining = (due_date - today).num_days();
    (0..=days).contains(&remaining)
}

pub fn check_pay(status: InvoiceStatus) -> Result<(), BillingError> {
    match status {
        InvoiceStatus::Pending | InvoiceStatus::Expired => Ok(()),
        InvoiceStatus::Paid => Err(BillingError::AlreadyPaid),
        InvoiceStatus::Cancelled => Err(BillingError::InvalidTransition {
            from: status,
            action: "pagar",
        }),
    }
}

/// Ok(false) means the invoice is already cancelled and nothing changes.
pub fn check_cancel(status: InvoiceStatus) -> Result<bool, BillingError> {
    match status {
        InvoiceStatus::Pending | InvoiceStatus::Expired => Ok(true),
        InvoiceStatus::Cancelled => Ok(false),
        InvoiceStatus::Paid => Err(BillingError::InvalidTransition {
            from: status,
            action: "cancelar",
        }),
    }
}

fn clamp_day(year: i32, month: u32, day: u32) -> u32 {
    if day < 1 {
        return 1;
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| d.day())
        .unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(year, month, 1)
                .map(|first| end_of_month(first).day())
                .unwrap_or(28)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_parses_and_displays() {
        let period: Period = "2024-02".parse().unwrap();
        assert_eq!(period.to_string(), "2024-02");
        assert_eq!(period.last_day(), date(2024, 2, 29));
        assert!("2024-13".parse::<Period>().is_err());
        assert!("24-01".parse::<Period>().is_err());
        assert!("2024/01".parse::<Period>().is_err());
    }

    #[test]
    fn signed_parts_are_rejected() {
        assert!("2024-+5".parse::<Period>().is_err());
        assert!("+024-05".parse::<Period>().is_err());
        assert!("2024--5".parse::<Period>().is_err());
        assert_eq!(" 2024-05 ".parse::<Period>().unwrap().to_string(), "2024-05");
    }

    #[test]
    fn due_day_is_clamped_to_month_length() {
        let feb: Period = "2023-02".parse().unwrap();
        assert_eq!(feb.due_date(31), date(2023, 2, 28));
        assert_eq!(feb.due_date(10), date(2023, 2, 10));
        assert_eq!(feb.due_date(0), date(2023, 2, 1));
    }

    #[test]
    fn late_issue_gets_grace_period() {
        let period: Period = "2024-05".parse().unwrap();
        assert_eq!(invoice_due_date(&period, 10, date(2024, 5, 1), 7), date(2024, 5, 10));
        assert_eq!(invoice_due_date(&period, 10, date(2024, 5, 10), 7), date(2024, 5, 10));
        assert_eq!(invoice_due_date(&period, 10, date(2024, 5, 20), 7), date(2024, 5, 27));
    }

    #[test]
    fn adding_days_saturates_instead_of_panicking() {
        assert_eq!(add_days(date(2024, 2, 25), 5), date(2024, 3, 1));
        assert_eq!(add_days(date(2024, 2, 25), i64::MAX), NaiveDate::MAX);
        assert_eq!(add_days(date(2024, 2, 25), i64::MIN), NaiveDate::MIN);
        let period: Period = "2024-05".parse().unwrap();
        assert_eq!(invoice_due_date(&period, 10, date(2024, 5, 20), i64::MAX), NaiveDate::MAX);
    }

    #[test]
    fn payment_extends_to_end_of_next_month() {
        assert_eq!(end_of_next_month(date(2024, 1, 31)), date(2024, 2, 29));
        assert_eq!(end_of_next_month(date(2024, 12, 5)), date(2025, 1, 31));
        assert_eq!(end_of_next_month(date(2024, 3, 1)), date(2024, 4, 30));
    }

    #[test]
    fn total_is_member_count_times_price() {
        assert_eq!(invoice_total(7, 12.5), 87.5);
        assert_eq!(invoice_total(3, 0.1), 0.3);
        assert_eq!(invoice_total(0, 99.0), 0.0);
    }

    #[test]
    fn overdue_only_after_due_date() {
        let due = date(2024, 5, 10);
        assert!(!is_overdue(InvoiceStatus::Pending, due, due));
        assert!(is_overdue(InvoiceStatus::Pending, due, date(2024, 5, 11)));
        assert!(!is_overdue(InvoiceStatus::Paid, due, date(2024, 6, 1)));
    }

    #[test]
    fn reminder_window_counts_days_left() {
        let due = date(2024, 5, 10);
        assert!(within_reminder_window(due, date(2024, 5, 7), 3));
        assert!(within_reminder_window(due, due, 3));
        assert!(!within_reminder_window(due, date(2024, 5, 6), 3));
        assert!(!within_reminder_window(due, date(2024, 5, 11), 3));
    }

    #[test]
    fn lifecycle_guards() {
        assert!(check_pay(InvoiceStatus::Pending).is_ok());
        assert!(check_pay(InvoiceStatus::Expired).is_ok());
        assert_eq!(check_pay(InvoiceStatus::Paid), Err(BillingError::AlreadyPaid));
        assert!(check_pay(InvoiceStatus::Cancelled).is_err());

        assert_eq!(check_cancel(InvoiceStatus::Pending), Ok(true));
        assert_eq!(check_cancel(InvoiceStatus::Cancelled), Ok(false));
        assert!(check_cancel(InvoiceStatus::Paid).is_err());
    }
}
