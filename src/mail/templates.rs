//! Email bodies rendered from `templates/emails/`.

use askama::Template;

use super::{Email, MailError};
use crate::models::{Invoice, Organization};

#[derive(Template)]
#[template(path = "emails/invoice_issued.txt")]
struct InvoiceIssuedTemplate<'a> {
    organization: &'a str,
    period: &'a str,
    member_count: i64,
    unit_price: String,
    total: String,
    due_date: String,
}

#[derive(Template)]
#[template(path = "emails/invoice_reminder.txt")]
struct InvoiceReminderTemplate<'a> {
    organization: &'a str,
    period: &'a str,
    total: String,
    due_date: String,
}

#[derive(Template)]
#[template(path = "emails/invoice_expired.txt")]
struct InvoiceExpiredTemplate<'a> {
    organization: &'a str,
    period: &'a str,
    total: String,
}

#[derive(Template)]
#[template(path = "emails/invoice_paid.txt")]
struct InvoicePaidTemplate<'a> {
    organization: &'a str,
    period: &'a str,
    total: String,
    expires_at: String,
}

#[derive(Template)]
#[template(path = "emails/trial_ending.txt")]
struct TrialEndingTemplate<'a> {
    organization: &'a str,
    trial_ends_at: String,
    days_left: i64,
}

#[derive(Template)]
#[template(path = "emails/trial_expired.txt")]
struct TrialExpiredTemplate<'a> {
    organization: &'a str,
}

#[derive(Template)]
#[template(path = "emails/organization_disabled.txt")]
struct OrganizationDisabledTemplate<'a> {
    organization: &'a str,
    expired_on: String,
}

#[derive(Template)]
#[template(path = "emails/contact_list_message.txt")]
struct ContactListMessageTemplate<'a> {
    organization: &'a str,
    list: &'a str,
    body: &'a str,
}

fn render<T: Template>(tpl: T) -> Result<String, MailError> {
    tpl.render().map_err(|e| MailError::Render(e.to_string()))
}

pub fn money(amount: f64, currency: &str) -> String {
    format!("{amount:.2} {currency}")
}

pub fn invoice_issued(
    to: Vec<String>,
    org: &Organization,
    invoice: &Invoice,
) -> Result<Email, MailError> {
    let body = render(InvoiceIssuedTemplate {
        organization: &org.name,
        period: &invoice.period,
        member_count: invoice.member_count,
        unit_price: money(invoice.unit_price, &invoice.currency),
        total: money(invoice.total, &invoice.currency),
        due_date: invoice.due_date.to_string(),
    })?;
    Ok(Email {
        to,
        subject: format!("Factura {} de {}", invoice.period, org.name),
        body,
    })
}

pub fn invoice_reminder(
    to: Vec<String>,
    org: &Organization,
    invoice: &Invoice,
) -> Result<Email, MailError> {
    let body = render(InvoiceReminderTemplate {
        organization: &org.name,
        period: &invoice.period,
        total: money(invoice.total, &invoice.currency),
        due_date: invoice.due_date.to_string(),
    })?;
    Ok(Email {
        to,
        subject: format!("Recordatorio: factura {} por vencer", invoice.period),
        body,
    })
}

pub fn invoice_expired(
    to: Vec<String>,
    org: &Organization,
    invoice: &Invoice,
) -> Result<Email, MailError> {
    let body = render(InvoiceExpiredTemplate {
        organization: &org.name,
        period: &invoice.period,
        total: money(invoice.total, &invoice.currency),
    })?;
    Ok(Email {
        to,
        subject: format!("Factura {} vencida: {} deshabilitada", invoice.period, org.name),
        body,
    })
}

pub fn invoice_paid(
    to: Vec<String>,
    org: &Organization,
    invoice: &Invoice,
) -> Result<Email, MailError> {
    let body = render(InvoicePaidTemplate {
        organization: &org.name,
        period: &invoice.period,
        total: money(invoice.total, &invoice.currency),
        expires_at: org
            .expires_at
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into()),
    })?;
    Ok(Email {
        to,
        subject: format!("Pago recibido: factura {}", invoice.period),
        body,
    })
}

pub fn trial_ending(
    to: Vec<String>,
    org: &Organization,
    days_left: i64,
) -> Result<Email, MailError> {
    let body = render(TrialEndingTemplate {
        organization: &org.name,
        trial_ends_at: org
            .trial_ends_at
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into()),
        days_left,
    })?;
    Ok(Email {
        to,
        subject: format!("El periodo de prueba de {} está por terminar", org.name),
        body,
    })
}

pub fn trial_expired(to: Vec<String>, org: &Organization) -> Result<Email, MailError> {
    let body = render(TrialExpiredTemplate {
        organization: &org.name,
    })?;
    Ok(Email {
        to,
        subject: format!("Terminó el periodo de prueba de {}", org.name),
        body,
    })
}

pub fn organization_disabled(to: Vec<String>, org: &Organization) -> Result<Email, MailError> {
    let body = render(OrganizationDisabledTemplate {
        organization: &org.name,
        expired_on: org
            .expires_at
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into()),
    })?;
    Ok(Email {
        to,
        subject: format!("{} fue deshabilitada", org.name),
        body,
    })
}

pub fn contact_list_message(
    to: Vec<String>,
    org: &Organization,
    list: &str,
    subject: &str,
    body: &str,
) -> Result<Email, MailError> {
    let body = render(ContactListMessageTemplate {
        organization: &org.name,
        list,
        body,
    })?;
    Ok(Email {
        to,
        subject: subject.to_string(),
        body,
    })
}
