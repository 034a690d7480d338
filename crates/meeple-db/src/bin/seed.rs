//! # Seed Data Generator
//!
//! Populates the database with membership plans and customers for
//! development.
//!
//! ## Usage
//! ```bash
//! # Three plans and 20 customers (default)
//! cargo run -p meeple-db --bin seed
//!
//! # Custom customer count
//! cargo run -p meeple-db --bin seed -- --customers 100
//!
//! # Specify database path
//! cargo run -p meeple-db --bin seed -- --db ./data/meeple.db
//! ```

use chrono::Utc;
use meeple_core::MembershipPlan;
use meeple_db::{Database, DbConfig};
use std::env;
use uuid::Uuid;

/// (name, description, price ¥, hours included, overage ¥/h, bonus points, yen per point)
const PLANS: &[(&str, &str, i64, f64, i64, i64, Option<i64>)] = &[
    ("Light", "10 hours a month", 3_000, 10.0, 400, 50, None),
    ("Regular", "20 hours a month", 5_000, 20.0, 300, 100, Some(40)),
    ("Unlimited Weekday", "60 hours a month", 12_000, 60.0, 200, 300, Some(25)),
];

const FIRST_NAMES: &[&str] = &[
    "Aiko", "Haruto", "Yui", "Sota", "Mei", "Ren", "Hina", "Yuto", "Sakura", "Riku",
];

const LAST_NAMES: &[&str] = &["Sato", "Suzuki", "Takahashi", "Tanaka", "Ito", "Watanabe"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut customers: usize = 20;
    let mut db_path = String::from("./meeple_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--customers" | "-c" => {
                if i + 1 < args.len() {
                    customers = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Meeple POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --customers <N>  Number of customers to create (default: 20)");
                println!("  -d, --db <PATH>      Database file path (default: ./meeple_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Meeple POS Seed Data Generator");
    println!("=================================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", customers);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.plans().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} plans", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Creating membership plans...");
    for plan in PLANS.iter().map(build_plan) {
        db.plans().insert(&plan).await?;
        println!("  {} - {} / month", plan.name, plan.price());
    }

    println!();
    println!("Creating customers...");
    let mut created = 0;
    for n in 0..customers {
        let first = FIRST_NAMES[n % FIRST_NAMES.len()];
        let last = LAST_NAMES[(n / FIRST_NAMES.len()) % LAST_NAMES.len()];
        let name = format!("{} {}", first, last);
        let email = format!("{}.{}.{}@example.com", first, last, n).to_lowercase();

        if let Err(e) = db.customers().create(&name, Some(&email)).await {
            eprintln!("Failed to insert {}: {}", name, e);
            continue;
        }
        created += 1;
    }

    println!("✓ Created {} customers", created);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn build_plan(
    &(name, description, price_yen, hours_included, overage_yen, bonus, earn_rate): &(
        &str,
        &str,
        i64,
        f64,
        i64,
        i64,
        Option<i64>,
    ),
) -> MembershipPlan {
    let now = Utc::now();
    MembershipPlan {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        price_minor: price_yen * 100,
        hours_included,
        overage_rate_minor: overage_yen * 100,
        points_on_purchase: bonus,
        earn_rate_denominator: earn_rate,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
