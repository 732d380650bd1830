//! # Seed Data Generator
//!
//! Populates a database with a demo gym for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./gym_dev.db for owner "demo-owner"
//! cargo run -p gym-db --bin seed
//!
//! # Specify database path and owner
//! cargo run -p gym-db --bin seed -- --db ./data/gym.db --owner 7f1c...
//! ```
//!
//! ## Generated Data
//! - Products: supplements, drinks, snacks and accessories with stock levels
//!   spread across in-stock, low-stock and out-of-stock
//! - Membership types: weekly, monthly, quarterly, yearly, day pass
//! - Members: a handful of members, some with an assigned membership

use chrono::{Days, Utc};
use std::env;

use gym_core::{
    derive_status, new_id, DurationDescriptor, Member, MemberMembership, MembershipKind,
    MembershipType, PaymentStatus, Product, DEFAULT_REORDER_THRESHOLD,
};
use gym_db::{CatalogStore, Database, DbConfig, MemberStore, MembershipStore};

/// (code, name, price_cents, cost_cents, stock)
const PRODUCTS: &[(&str, &str, i64, i64, i64)] = &[
    ("PROT-WHEY-1KG", "Whey Protein 1kg", 89900, 62000, 12),
    ("PROT-WHEY-2KG", "Whey Protein 2kg", 159900, 110000, 4),
    ("CREA-300G", "Creatine Monohydrate 300g", 49900, 30000, 9),
    ("PRE-WO-300G", "Pre-Workout 300g", 59900, 38000, 0),
    ("BCAA-250G", "BCAA 250g", 42900, 26000, 6),
    ("WATER-500", "Water 500ml", 1500, 600, 48),
    ("WATER-1L", "Water 1L", 2500, 1000, 30),
    ("ISO-600", "Isotonic Drink 600ml", 3000, 1500, 24),
    ("ENERGY-473", "Energy Drink 473ml", 4500, 2500, 3),
    ("BAR-PROT", "Protein Bar", 4000, 2200, 40),
    ("BAR-OAT", "Oat Bar", 2500, 1200, 18),
    ("TOWEL", "Gym Towel", 19900, 9000, 7),
    ("SHAKER", "Shaker Bottle", 14900, 6000, 15),
    ("GLOVES-M", "Training Gloves M", 29900, 15000, 2),
    ("LOCK", "Locker Padlock", 12900, 5000, 10),
];

/// (name, kind, price_cents, months, weeks, days)
const MEMBERSHIP_TYPES: &[(&str, MembershipKind, i64, u32, u32, u32)] = &[
    ("Day Pass", MembershipKind::Days, 8000, 0, 0, 1),
    ("Weekly", MembershipKind::Weekly, 25000, 0, 1, 0),
    ("Monthly", MembershipKind::Monthly, 60000, 1, 0, 0),
    ("Quarterly", MembershipKind::Monthly, 160000, 3, 0, 0),
    ("Yearly", MembershipKind::Yearly, 550000, 12, 0, 0),
];

/// (first_name, last_name, email)
const MEMBERS: &[(&str, &str, &str)] = &[
    ("Ana", "García", "ana.garcia@example.com"),
    ("Luis", "Hernández", "luis.hernandez@example.com"),
    ("María", "López", "maria.lopez@example.com"),
    ("Jorge", "Martínez", "jorge.martinez@example.com"),
    ("Sofía", "Ramírez", "sofia.ramirez@example.com"),
    ("Diego", "Torres", "diego.torres@example.com"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./gym_dev.db");
    let mut owner_id = String::from("demo-owner");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--owner" | "-o" => {
                if i + 1 < args.len() {
                    owner_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Gym Back-Office Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>     Database file path (default: ./gym_dev.db)");
                println!("  -o, --owner <ID>    Owner id to seed (default: demo-owner)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Gym Back-Office Seed Data Generator");
    println!("======================================");
    println!("Database: {}", db_path);
    println!("Owner:    {}", owner_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count(&owner_id).await?;
    if existing > 0 {
        println!("⚠ Owner already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let now = Utc::now();

    // Products
    let products = db.products();
    for (code, name, price_cents, cost_cents, stock) in PRODUCTS {
        let product = Product {
            id: new_id(),
            owner_id: owner_id.clone(),
            code: code.to_string(),
            name: name.to_string(),
            description: None,
            cost_cents: *cost_cents,
            price_cents: *price_cents,
            stock_quantity: *stock,
            reorder_threshold: DEFAULT_REORDER_THRESHOLD,
            status: derive_status(*stock, DEFAULT_REORDER_THRESHOLD),
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = products.put_product(&product).await {
            eprintln!("Failed to insert {}: {}", product.code, e);
        }
    }
    println!("✓ Inserted {} products", PRODUCTS.len());

    // Membership types
    let memberships = db.memberships();
    let mut monthly: Option<MembershipType> = None;
    for (name, kind, price_cents, months, weeks, days) in MEMBERSHIP_TYPES {
        let membership_type = MembershipType {
            id: new_id(),
            owner_id: owner_id.clone(),
            name: name.to_string(),
            description: None,
            price_cents: *price_cents,
            duration: DurationDescriptor::new(*months, *weeks, *days),
            kind: *kind,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        memberships.insert_type(&membership_type).await?;
        if *name == "Monthly" {
            monthly = Some(membership_type);
        }
    }
    println!("✓ Inserted {} membership types", MEMBERSHIP_TYPES.len());

    // Members; every other one gets a monthly membership that started
    // some days ago
    let members = db.members();
    let mut assigned = 0;
    for (idx, (first_name, last_name, email)) in MEMBERS.iter().enumerate() {
        let member = Member {
            id: new_id(),
            owner_id: owner_id.clone(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: Some(email.to_string()),
            phone: None,
            is_active: true,
            active_membership_id: None,
            created_at: now,
            updated_at: now,
        };
        members.insert_member(&member).await?;

        let Some(monthly) = monthly.as_ref() else { continue };
        if idx % 2 != 0 {
            continue;
        }

        let start = now
            .date_naive()
            .checked_sub_days(Days::new(10 * idx as u64))
            .unwrap_or_else(|| now.date_naive());
        let end = monthly.duration.end_date(start)?;
        let membership = MemberMembership {
            id: new_id(),
            owner_id: owner_id.clone(),
            member_id: member.id.clone(),
            membership_type_id: monthly.id.clone(),
            start_date: start,
            end_date: end,
            payment_status: PaymentStatus::Paid,
            price_cents: monthly.price_cents,
            notes: None,
            paid_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        if memberships.assign_membership(&membership).await? {
            assigned += 1;
        }
    }
    println!(
        "✓ Inserted {} members ({} with a monthly membership)",
        MEMBERS.len(),
        assigned
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
