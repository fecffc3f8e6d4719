#[path = "common/mod.rs"]
mod common;

use mongodb::bson::oid::ObjectId;
use tesoreria::{
    error::AppError,
    models::{MovementStatus, MovementType},
    state::{
        MovementFilter, MovementInput, SupplierFields, create_movement, create_payment_mode, create_project,
        create_supplier, delete_movement, delete_project, delete_supplier, list_movements, list_projects,
        movement_summary, update_movement,
    },
};

use common::{date, organization_with_admin, setup_state, teardown};

fn movement(movement_type: MovementType, amount: f64, day: u32) -> MovementInput {
    MovementInput {
        date: date(2024, 4, day),
        amount,
        movement_type,
        status: MovementStatus::Confirmed,
        description: format!("{} {amount}", movement_type.as_str()),
        reference: None,
        project_id: None,
        member_id: None,
        supplier_id: None,
        payment_mode_id: None,
    }
}

#[tokio::test]
async fn summary_tracks_balance_per_project() {
    let Some(ctx) = setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let (org, _) = organization_with_admin(state, "Huerto", date(2024, 4, 1)).await;
    let project = create_project(state, &org, "Invernadero", None, true).await.unwrap();

    create_movement(state, &org, movement(MovementType::Initial, 1000.0, 1)).await.unwrap();
    create_movement(
        state,
        &org,
        MovementInput {
            project_id: Some(project),
            ..movement(MovementType::Income, 250.5, 3)
        },
    )
    .await
    .unwrap();
    create_movement(
        state,
        &org,
        MovementInput {
            project_id: Some(project),
            ..movement(MovementType::Expense, 100.25, 5)
        },
    )
    .await
    .unwrap();
    create_movement(
        state,
        &org,
        MovementInput {
            status: MovementStatus::Pending,
            ..movement(MovementType::Expense, 999.0, 6)
        },
    )
    .await
    .unwrap();

    let summary = movement_summary(state, &org, None, None).await.unwrap();
    assert_eq!(summary.count, 3);
    assert_eq!(summary.initial, 1000.0);
    assert_eq!(summary.income, 250.5);
    assert_eq!(summary.expense, 100.25);
    assert_eq!(summary.balance, 1150.25);
    assert_eq!(summary.by_project.len(), 1);
    assert_eq!(summary.by_project[0].project_id, Some(project.to_hex()));
    assert_eq!(summary.by_project[0].balance, 150.25);

    let ranged = movement_summary(state, &org, Some(date(2024, 4, 2)), Some(date(2024, 4, 4)))
        .await
        .unwrap();
    assert_eq!(ranged.count, 1);
    assert_eq!(ranged.balance, 250.5);

    let expenses = list_movements(
        state,
        &org,
        &MovementFilter {
            movement_type: Some(MovementType::Expense),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(expenses.len(), 2);
    // Newest first.
    assert_eq!(expenses[0].date, date(2024, 4, 6));
    teardown(ctx).await;
}

#[tokio::test]
async fn only_one_initial_balance_per_organization() {
    let Some(ctx) = setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let (org, _) = organization_with_admin(state, "Taller", date(2024, 4, 1)).await;

    let initial = create_movement(state, &org, movement(MovementType::Initial, 500.0, 1)).await.unwrap();
    let err = create_movement(state, &org, movement(MovementType::Initial, 10.0, 2))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Conflict(_))));

    // Editing the existing initial balance is allowed.
    update_movement(state, &initial, &org, movement(MovementType::Initial, 600.0, 1))
        .await
        .unwrap();

    let income = create_movement(state, &org, movement(MovementType::Income, 10.0, 2)).await.unwrap();
    let err = update_movement(state, &income, &org, movement(MovementType::Initial, 10.0, 2))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Conflict(_))));

    let err = create_movement(state, &org, movement(MovementType::Income, 0.0, 3))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Validation(_))));

    // A cancelled initial balance frees the slot.
    update_movement(
        state,
        &initial,
        &org,
        MovementInput {
            status: MovementStatus::Cancelled,
            ..movement(MovementType::Initial, 600.0, 1)
        },
    )
    .await
    .unwrap();
    create_movement(state, &org, movement(MovementType::Initial, 700.0, 1)).await.unwrap();
    teardown(ctx).await;
}

#[tokio::test]
async fn catalogs_stay_within_their_organization() {
    let Some(ctx) = setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let (mine, _) = organization_with_admin(state, "Propia", date(2024, 4, 1)).await;
    let (theirs, _) = organization_with_admin(state, "Ajena", date(2024, 4, 1)).await;

    let foreign_project = create_project(state, &theirs, "Ajeno", None, true).await.unwrap();
    let err = create_movement(
        state,
        &mine,
        MovementInput {
            project_id: Some(foreign_project),
            ..movement(MovementType::Income, 5.0, 2)
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Forbidden(_))));

    let err = create_movement(
        state,
        &mine,
        MovementInput {
            supplier_id: Some(ObjectId::new()),
            ..movement(MovementType::Expense, 5.0, 2)
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Validation(_))));

    let supplier = create_supplier(
        state,
        &mine,
        SupplierFields {
            name: "Ferretería".into(),
            tax_id: Some("FER010101AAA".into()),
            email: None,
            phone: None,
            notes: None,
        },
    )
    .await
    .unwrap();
    let mode = create_payment_mode(state, &mine, "Transferencia", true).await.unwrap();
    let spent = create_movement(
        state,
        &mine,
        MovementInput {
            supplier_id: Some(supplier),
            payment_mode_id: Some(mode),
            ..movement(MovementType::Expense, 80.0, 4)
        },
    )
    .await
    .unwrap();

    // Referenced catalog entries cannot be removed until the movement goes.
    let err = delete_supplier(state, &supplier).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Conflict(_))));
    delete_movement(state, &spent).await.unwrap();
    delete_supplier(state, &supplier).await.unwrap();

    assert_eq!(list_projects(state, &mine).await.unwrap().len(), 0);
    delete_project(state, &foreign_project).await.unwrap();
    assert!(list_projects(state, &theirs).await.unwrap().is_empty());
    teardown(ctx).await;
}
