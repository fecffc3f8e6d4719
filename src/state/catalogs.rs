// Per-organization catalogs referenced by movements: projects, suppliers, payment modes.

use anyhow::{Context, Result};
use futures::stream::TryStreamExt;
use mongodb::bson::{Document, doc, oid::ObjectId};

use crate::{
    error::AppError,
    models::{PaymentMode, Project, Supplier},
};

use super::{AppState, now};

pub async fn list_projects(state: &AppState, organization_id: &ObjectId) -> Result<Vec<Project>> {
    let mut cursor = state
        .projects
        .find(doc! { "organization_id": organization_id })
        .sort(doc! { "name": 1 })
        .await?;
    let mut items = Vec::new();
    while let Some(project) = cursor.try_next().await? {
        items.push(project);
    }
    Ok(items)
}

pub async fn get_project_by_id(state: &AppState, id: &ObjectId) -> Result<Option<Project>> {
    state
        .projects
        .find_one(doc! { "_id": id })
        .await
        .map_err(Into::into)
}

pub async fn create_project(
    state: &AppState,
    organization_id: &ObjectId,
    name: &str,
    description: Option<String>,
    active: bool,
) -> Result<ObjectId> {
    let res = state
        .projects
        .insert_one(Project {
            id: None,
            organization_id: *organization_id,
            name: name.to_string(),
            description,
            active,
            created_at: Some(now()),
            updated_at: None,
        })
        .await?;
    res.inserted_id
        .as_object_id()
        .context("project insert missing _id")
}

pub async fn update_project(
    state: &AppState,
    id: &ObjectId,
    name: &str,
    description: Option<String>,
    active: bool,
) -> Result<()> {
    state
        .projects
        .update_one(
            doc! { "_id": id },
            doc! { "$set": {
                "name": name,
                "description": description,
                "active": active,
                "updated_at": now(),
            } },
        )
        .await?;
    Ok(())
}

pub async fn delete_project(state: &AppState, id: &ObjectId) -> Result<()> {
    ensure_unreferenced(state, "project_id", id, "el proyecto").await?;
    state.projects.delete_one(doc! { "_id": id }).await?;
    Ok(())
}

pub async fn list_suppliers(state: &AppState, organization_id: &ObjectId) -> Result<Vec<Supplier>> {
    let mut cursor = state
        .suppliers
        .find(doc! { "organization_id": organization_id })
        .sort(doc! { "name": 1 })
        .await?;
    let mut items = Vec::new();
    while let Some(supplier) = cursor.try_next().await? {
        items.push(supplier);
    }
    Ok(items)
}

pub async fn get_supplier_by_id(state: &AppState, id: &ObjectId) -> Result<Option<Supplier>> {
    state
        .suppliers
        .find_one(doc! { "_id": id })
        .await
        .map_err(Into::into)
}

pub struct SupplierFields {
    pub name: String,
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

pub async fn create_supplier(
    state: &AppState,
    organization_id: &ObjectId,
    fields: SupplierFields,
) -> Result<ObjectId> {
    let res = state
        .suppliers
        .insert_one(Supplier {
            id: None,
            organization_id: *organization_id,
            name: fields.name,
            tax_id: fields.tax_id,
            email: fields.email,
            phone: fields.phone,
            notes: fields.notes,
            created_at: Some(now()),
            updated_at: None,
        })
        .await?;
    res.inserted_id
        .as_object_id()
        .context("supplier insert missing _id")
}

pub async fn update_supplier(state: &AppState, id: &ObjectId, fields: SupplierFields) -> Result<()> {
    state
        .suppliers
        .update_one(
            doc! { "_id": id },
            doc! { "$set": {
                "name": fields.name,
                "tax_id": fields.tax_id,
                "email": fields.email,
                "phone": fields.phone,
                "notes": fields.notes,
                "updated_at": now(),
            } },
        )
        .await?;
    Ok(())
}

pub async fn delete_supplier(state: &AppState, id: &ObjectId) -> Result<()> {
    ensure_unreferenced(state, "supplier_id", id, "el proveedor").await?;
    state.suppliers.delete_one(doc! { "_id": id }).await?;
    Ok(())
}

pub async fn list_payment_modes(state: &AppState, organization_id: &ObjectId) -> Result<Vec<PaymentMode>> {
    let mut cursor = state
        .payment_modes
        .find(doc! { "organization_id": organization_id })
        .sort(doc! { "name": 1 })
        .await?;
    let mut items = Vec::new();
    while let Some(mode) = cursor.try_next().await? {
        items.push(mode);
    }
    Ok(items)
}

pub async fn get_payment_mode_by_id(state: &AppState, id: &ObjectId) -> Result<Option<PaymentMode>> {
    state
        .payment_modes
        .find_one(doc! { "_id": id })
        .await
        .map_err(Into::into)
}

pub async fn create_payment_mode(
    state: &AppState,
    organization_id: &ObjectId,
    name: &str,
    active: bool,
) -> Result<ObjectId> {
    let res = state
        .payment_modes
        .insert_one(PaymentMode {
            id: None,
            organization_id: *organization_id,
            name: name.to_string(),
            active,
            created_at: Some(now()),
            updated_at: None,
        })
        .await?;
    res.inserted_id
        .as_object_id()
        .context("payment mode insert missing _id")
}

pub async fn update_payment_mode(state: &AppState, id: &ObjectId, name: &str, active: bool) -> Result<()> {
    state
        .payment_modes
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "name": name, "active": active, "updated_at": now() } },
        )
        .await?;
    Ok(())
}

pub async fn delete_payment_mode(state: &AppState, id: &ObjectId) -> Result<()> {
    ensure_unreferenced(state, "payment_mode_id", id, "el modo de pago").await?;
    state.payment_modes.delete_one(doc! { "_id": id }).await?;
    Ok(())
}

async fn ensure_unreferenced(state: &AppState, field: &str, id: &ObjectId, label: &str) -> Result<()> {
    let mut filter = Document::new();
    filter.insert(field, *id);
    let referenced = state.movements.find_one(filter).await?.is_some();
    if referenced {
        return Err(AppError::Conflict(format!(
            "{label} tiene movimientos asociados; no se puede eliminar"
        ))
        .into());
    }
    Ok(())
}
