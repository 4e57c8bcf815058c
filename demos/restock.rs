//! Walks one consumable through intake, consumption and a reviewed restock.
//!
//! RUST_LOG=asset_workflow=debug cargo run --example restock
use anyhow::Context;
use asset_workflow::{
    asset::{AssetType, Category, InventorySource},
    config::EngineConfig,
    matcher::ProposedConsumable,
    permission::{Actor, Role},
    service::{AssetService, IntakeDecision},
    utils::new_category_id,
};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let temp_dir = tempfile::tempdir()?;
    let config = EngineConfig {
        db_path: temp_dir
            .path()
            .join("restock.db")
            .to_string_lossy()
            .into_owned(),
        ..EngineConfig::default()
    };
    let service = AssetService::open(&config)?;

    let director = Actor::new("user_director", Role::AssetDirector);
    let storekeeper = Actor::new("user_store", Role::Warehouseman).in_project("proj_north");
    let clerk = Actor::new("user_clerk", Role::SiteInventoryClerk).in_project("proj_north");
    let manager = Actor::new("user_pm", Role::ProjectManager).in_project("proj_north");
    let finance = Actor::new("user_finance", Role::FinanceDirector);

    let cement = service
        .register_category(
            &director,
            Category::new(new_category_id()?, "Cement", AssetType::Inventory).consumable(),
        )?
        .context("category registration refused")?;

    let bags = || {
        ProposedConsumable::new("Portland Cement", cement.id.clone(), "proj_north", 0)
            .set_model("Type I")
            .set_unit("bag")
    };

    let first = service
        .report_consumable(
            &storekeeper,
            ProposedConsumable { quantity: 40, ..bags() },
            InventorySource::Procurement,
        )?
        .context("initial intake refused")?;
    let asset_id = first.asset().id.clone();
    println!("created {asset_id}: {} bags", first.asset().quantity);

    let used = service
        .ledger()
        .consume(&asset_id, &clerk, 12, "slab pour, level 2")?
        .context("consumption refused")?;
    println!("available after pour: {}", used.asset.available_quantity);

    let restock = service
        .report_consumable(
            &storekeeper,
            ProposedConsumable { quantity: 25, ..bags() },
            InventorySource::Procurement,
        )?
        .context("restock refused")?;
    if let IntakeDecision::Restocked { asset, added, from } = &restock {
        println!(
            "merged {added} bags into {}, moved {from} -> {}",
            asset.id, asset.workflow_status
        );
    }

    service
        .workflow()
        .verify(&asset_id, &manager, Some("delivery note checked".into()))?
        .context("verification refused")?;
    let approved = service
        .workflow()
        .authorize(&asset_id, &finance, None)?
        .context("authorization refused")?;
    println!(
        "approved: quantity={} available={}",
        approved.quantity, approved.available_quantity
    );

    for record in service.audit_trail(&asset_id)? {
        println!("  {:<20} {}", record.action.as_str(), record.description);
    }
    Ok(())
}
