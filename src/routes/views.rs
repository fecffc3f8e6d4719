// JSON shapes returned by the API. Ids are hex strings and timestamps RFC 3339.

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    models::{ContactList, Invoice, Movement, Organization, PaymentMode, Project, Supplier},
    state::{MemberWithOrganizations, OrganizationAccess, OrganizationMember},
};

use super::helpers::{opt_datetime, opt_hex};

#[derive(Serialize)]
pub struct OrganizationView {
    pub id: Option<String>,
    pub name: String,
    pub slug: String,
    pub trial: bool,
    pub trial_ends_at: Option<NaiveDate>,
    pub enabled: bool,
    pub expires_at: Option<NaiveDate>,
    pub unit_price: Option<f64>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<Organization> for OrganizationView {
    fn from(org: Organization) -> Self {
        OrganizationView {
            id: opt_hex(&org.id),
            name: org.name,
            slug: org.slug,
            trial: org.trial,
            trial_ends_at: org.trial_ends_at,
            enabled: org.enabled,
            expires_at: org.expires_at,
            unit_price: org.unit_price,
            notes: org.notes,
            created_at: opt_datetime(&org.created_at),
            updated_at: opt_datetime(&org.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct OrganizationAccessView {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub enabled: bool,
    pub active: bool,
    pub admin: bool,
}

impl From<&OrganizationAccess> for OrganizationAccessView {
    fn from(access: &OrganizationAccess) -> Self {
        OrganizationAccessView {
            id: access.organization_id.to_hex(),
            slug: access.slug.clone(),
            name: access.name.clone(),
            enabled: access.enabled,
            active: access.active,
            admin: access.admin,
        }
    }
}

#[derive(Serialize)]
pub struct MeView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_superadmin: bool,
    pub organization: Option<OrganizationAccessView>,
    pub organizations: Vec<OrganizationAccessView>,
}

impl MeView {
    pub fn new(member: &MemberWithOrganizations, active: Option<&OrganizationAccess>) -> Self {
        MeView {
            id: member.id.to_hex(),
            name: member.name.clone(),
            email: member.email.clone(),
            phone: member.phone.clone(),
            is_superadmin: member.is_superadmin,
            organization: active.map(OrganizationAccessView::from),
            organizations: member.organizations.iter().map(OrganizationAccessView::from).collect(),
        }
    }
}

/// Member plus its pivot flags in the active organization. The TOTP secret is never exposed.
#[derive(Serialize)]
pub struct MemberView {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub active: bool,
    pub admin: bool,
    pub joined_at: Option<String>,
}

impl From<OrganizationMember> for MemberView {
    fn from(item: OrganizationMember) -> Self {
        MemberView {
            id: opt_hex(&item.member.id),
            name: item.member.name,
            email: item.member.email,
            phone: item.member.phone,
            active: item.membership.active,
            admin: item.membership.admin,
            joined_at: opt_datetime(&item.membership.joined_at),
        }
    }
}

#[derive(Serialize)]
pub struct ProjectView {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

impl From<Project> for ProjectView {
    fn from(p: Project) -> Self {
        ProjectView {
            id: opt_hex(&p.id),
            name: p.name,
            description: p.description,
            active: p.active,
        }
    }
}

#[derive(Serialize)]
pub struct SupplierView {
    pub id: Option<String>,
    pub name: String,
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl From<Supplier> for SupplierView {
    fn from(s: Supplier) -> Self {
        SupplierView {
            id: opt_hex(&s.id),
            name: s.name,
            tax_id: s.tax_id,
            email: s.email,
            phone: s.phone,
            notes: s.notes,
        }
    }
}

#[derive(Serialize)]
pub struct PaymentModeView {
    pub id: Option<String>,
    pub name: String,
    pub active: bool,
}

impl From<PaymentMode> for PaymentModeView {
    fn from(p: PaymentMode) -> Self {
        PaymentModeView {
            id: opt_hex(&p.id),
            name: p.name,
            active: p.active,
        }
    }
}

#[derive(Serialize)]
pub struct MovementView {
    pub id: Option<String>,
    pub date: NaiveDate,
    pub amount: f64,
    pub movement_type: &'static str,
    pub status: &'static str,
    pub description: String,
    pub reference: Option<String>,
    pub project_id: Option<String>,
    pub member_id: Option<String>,
    pub supplier_id: Option<String>,
    pub payment_mode_id: Option<String>,
    pub created_at: Option<String>,
}

impl From<Movement> for MovementView {
    fn from(m: Movement) -> Self {
        MovementView {
            id: opt_hex(&m.id),
            date: m.date,
            amount: m.amount,
            movement_type: m.movement_type.as_str(),
            status: m.status.as_str(),
            description: m.description,
            reference: m.reference,
            project_id: opt_hex(&m.project_id),
            member_id: opt_hex(&m.member_id),
            supplier_id: opt_hex(&m.supplier_id),
            payment_mode_id: opt_hex(&m.payment_mode_id),
            created_at: opt_datetime(&m.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct ContactListView {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub member_ids: Vec<String>,
}

impl From<ContactList> for ContactListView {
    fn from(l: ContactList) -> Self {
        ContactListView {
            id: opt_hex(&l.id),
            name: l.name,
            description: l.description,
            member_ids: l.member_ids.iter().map(|id| id.to_hex()).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct InvoiceView {
    pub id: Option<String>,
    pub organization_id: String,
    pub period: String,
    pub member_count: i64,
    pub unit_price: f64,
    pub total: f64,
    pub currency: String,
    pub due_date: NaiveDate,
    pub status: &'static str,
    pub paid_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub reminder_sent_at: Option<String>,
    pub created_at: Option<String>,
}

impl From<Invoice> for InvoiceView {
    fn from(i: Invoice) -> Self {
        InvoiceView {
            id: opt_hex(&i.id),
            organization_id: i.organization_id.to_hex(),
            period: i.period,
            member_count: i.member_count,
            unit_price: i.unit_price,
            total: i.total,
            currency: i.currency,
            due_date: i.due_date,
            status: i.status.as_str(),
            paid_at: opt_datetime(&i.paid_at),
            cancelled_at: opt_datetime(&i.cancelled_at),
            reminder_sent_at: opt_datetime(&i.reminder_sent_at),
            created_at: opt_datetime(&i.created_at),
        }
    }
}

pub fn collect<T, V: From<T>>(items: Vec<T>) -> Vec<V> {
    items.into_iter().map(V::from).collect()
}
