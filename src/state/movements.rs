use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::stream::TryStreamExt;
use mongodb::bson::{Document, doc, oid::ObjectId};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::{
    billing::round_cents,
    error::AppError,
    models::{Movement, MovementStatus, MovementType},
};

use super::{AppState, get_organization_member, now};

#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub movement_type: Option<MovementType>,
    pub status: Option<MovementStatus>,
    pub project_id: Option<ObjectId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl MovementFilter {
    fn to_document(&self, organization_id: &ObjectId) -> Document {
        let mut filter = doc! { "organization_id": organization_id };
        if let Some(t) = self.movement_type {
            filter.insert("movement_type", t.as_str());
        }
        if let Some(s) = self.status {
            filter.insert("status", s.as_str());
        }
        if let Some(p) = self.project_id {
            filter.insert("project_id", p);
        }
        let mut range = Document::new();
        if let Some(from) = self.from {
            range.insert("$gte", from.to_string());
        }
        if let Some(to) = self.to {
            range.insert("$lte", to.to_string());
        }
        if !range.is_empty() {
            filter.insert("date", range);
        }
        filter
    }
}

/// Writable fields of a movement.
#[derive(Debug, Clone)]
pub struct MovementInput {
    pub date: NaiveDate,
    pub amount: f64,
    pub movement_type: MovementType,
    pub status: MovementStatus,
    pub description: String,
    pub reference: Option<String>,
    pub project_id: Option<ObjectId>,
    pub member_id: Option<ObjectId>,
    pub supplier_id: Option<ObjectId>,
    pub payment_mode_id: Option<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectTotals {
    pub project_id: Option<String>,
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MovementSummary {
    pub initial: f64,
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
    pub count: usize,
    pub by_project: Vec<ProjectTotals>,
}

pub async fn list_movements(
    state: &AppState,
    organization_id: &ObjectId,
    filter: &MovementFilter,
) -> Result<Vec<Movement>> {
    let mut cursor = state
        .movements
        .find(filter.to_document(organization_id))
        .sort(doc! { "date": -1, "_id": -1 })
        .await?;
    let mut items = Vec::new();
    while let Some(movement) = cursor.try_next().await? {
        items.push(movement);
    }
    Ok(items)
}

pub async fn get_movement_by_id(state: &AppState, id: &ObjectId) -> Result<Option<Movement>> {
    state
        .movements
        .find_one(doc! { "_id": id })
        .await
        .map_err(Into::into)
}

pub async fn create_movement(
    state: &AppState,
    organization_id: &ObjectId,
    input: MovementInput,
) -> Result<ObjectId> {
    validate_movement_links(state, organization_id, &input).await?;
    if input.movement_type == MovementType::Initial {
        ensure_single_initial(state, organization_id, None).await?;
    }

    let res = state
        .movements
        .insert_one(Movement {
            id: None,
            organization_id: *organization_id,
            date: input.date,
            amount: round_cents(input.amount),
            movement_type: input.movement_type,
            status: input.status,
            description: input.description,
            reference: input.reference,
            project_id: input.project_id,
            member_id: input.member_id,
            supplier_id: input.supplier_id,
            payment_mode_id: input.payment_mode_id,
            created_at: Some(now()),
            updated_at: None,
        })
        .await?;
    res.inserted_id
        .as_object_id()
        .context("movement insert missing _id")
}

pub async fn update_movement(
    state: &AppState,
    id: &ObjectId,
    organization_id: &ObjectId,
    input: MovementInput,
) -> Result<()> {
    validate_movement_links(state, organization_id, &input).await?;
    if input.movement_type == MovementType::Initial {
        ensure_single_initial(state, organization_id, Some(id)).await?;
    }

    state
        .movements
        .update_one(
            doc! { "_id": id, "organization_id": organization_id },
            doc! { "$set": {
                "date": input.date.to_string(),
                "amount": round_cents(input.amount),
                "movement_type": input.movement_type.as_str(),
                "status": input.status.as_str(),
                "description": input.description,
                "reference": input.reference,
                "project_id": input.project_id,
                "member_id": input.member_id,
                "supplier_id": input.supplier_id,
                "payment_mode_id": input.payment_mode_id,
                "updated_at": now(),
            } },
        )
        .await?;
    Ok(())
}

pub async fn delete_movement(state: &AppState, id: &ObjectId) -> Result<()> {
    state.movements.delete_one(doc! { "_id": id }).await?;
    Ok(())
}

/// Summary over confirmed movements in the optional date range.
pub async fn movement_summary(
    state: &AppState,
    organization_id: &ObjectId,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<MovementSummary> {
    let filter = MovementFilter {
        status: Some(MovementStatus::Confirmed),
        from,
        to,
        ..Default::default()
    };
    let movements = list_movements(state, organization_id, &filter).await?;
    Ok(summarize(&movements))
}

/// Balance = initial + income - expense; cancelled and pending movements are left out.
pub fn summarize(movements: &[Movement]) -> MovementSummary {
    let mut summary = MovementSummary::default();
    let mut projects: BTreeMap<Option<String>, ProjectTotals> = BTreeMap::new();

    for m in movements
        .iter()
        .filter(|m| m.status == MovementStatus::Confirmed)
    {
        summary.count += 1;
        match m.movement_type {
            MovementType::Initial => summary.initial += m.amount,
            MovementType::Income => summary.income += m.amount,
            MovementType::Expense => summary.expense += m.amount,
        }
        if m.movement_type != MovementType::Initial {
            let key = m.project_id.map(|p| p.to_hex());
            let entry = projects.entry(key.clone()).or_insert_with(|| ProjectTotals {
                project_id: key,
                ..Default::default()
            });
            match m.movement_type {
                MovementType::Income => entry.income += m.amount,
                MovementType::Expense => entry.expense += m.amount,
                MovementType::Initial => {}
            }
        }
    }

    summary.initial = round_cents(summary.initial);
    summary.income = round_cents(summary.income);
    summary.expense = round_cents(summary.expense);
    summary.balance = round_cents(summary.initial + summary.income - summary.expense);
    summary.by_project = projects
        .into_values()
        .map(|mut p| {
            p.income = round_cents(p.income);
            p.expense = round_cents(p.expense);
            p.balance = round_cents(p.income - p.expense);
            p
        })
        .collect();
    summary
}

async fn ensure_single_initial(
    state: &AppState,
    organization_id: &ObjectId,
    except: Option<&ObjectId>,
) -> Result<()> {
    let mut filter = doc! {
        "organization_id": organization_id,
        "movement_type": MovementType::Initial.as_str(),
        "status": { "$ne": MovementStatus::Cancelled.as_str() },
    };
    if let Some(id) = except {
        filter.insert("_id", doc! { "$ne": id });
    }
    if state.movements.find_one(filter).await?.is_some() {
        return Err(AppError::Conflict("la organización ya tiene un saldo inicial".into()).into());
    }
    Ok(())
}

async fn validate_movement_links(
    state: &AppState,
    organization_id: &ObjectId,
    input: &MovementInput,
) -> Result<()> {
    if !(input.amount.is_finite() && input.amount > 0.0) {
        return Err(AppError::validation("el monto debe ser mayor a cero").into());
    }

    if let Some(id) = &input.project_id {
        let project = super::get_project_by_id(state, id)
            .await?
            .ok_or_else(|| AppError::validation("proyecto inexistente"))?;
        ensure_same_organization(&project.organization_id, organization_id)?;
    }
    if let Some(id) = &input.supplier_id {
        let supplier = super::get_supplier_by_id(state, id)
            .await?
            .ok_or_else(|| AppError::validation("proveedor inexistente"))?;
        ensure_same_organization(&supplier.organization_id, organization_id)?;
    }
    if let Some(id) = &input.payment_mode_id {
        let mode = super::get_payment_mode_by_id(state, id)
            .await?
            .ok_or_else(|| AppError::validation("modo de pago inexistente"))?;
        ensure_same_organization(&mode.organization_id, organization_id)?;
    }
    if let Some(id) = &input.member_id {
        get_organization_member(state, organization_id, id)
            .await?
            .ok_or_else(|| AppError::Forbidden("el asociado no pertenece a la organización".into()))?;
    }
    Ok(())
}

fn ensure_same_organization(entity: &ObjectId, active: &ObjectId) -> Result<(), AppError> {
    if entity != active {
        Err(AppError::Forbidden(
            "el registro pertenece a otra organización".into(),
        ))
    } else {
        Ok(())
    }
}
