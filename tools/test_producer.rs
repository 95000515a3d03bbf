//! Test Application Producer
//!
//! Generates random credit applications and publishes them to NATS, or prints
//! samples when no server is reachable.

use loan_scoring_pipeline::types::ApplicationForm;
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

const INCOME_TYPES: &[&str] = &[
    "Commercial associate",
    "Pensioner",
    "State servant",
    "Student",
    "Working",
];
const EDUCATION: &[&str] = &[
    "Academic degree",
    "Higher education",
    "Incomplete higher",
    "Lower secondary",
    "Secondary / secondary special",
];
const MARITAL_STATUS: &[&str] = &[
    "Civil marriage",
    "Married",
    "Separated",
    "Single / not married",
    "Widow",
];
const HOUSING_TYPES: &[&str] = &[
    "Co-op apartment",
    "House / apartment",
    "Municipal apartment",
    "Office apartment",
    "Rented apartment",
    "With parents",
];

/// Application generator for testing
struct ApplicationGenerator {
    rng: rand::rngs::ThreadRng,
    counter: u64,
}

impl ApplicationGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            counter: 0,
        }
    }

    /// Generate a well-formed application
    fn generate(&mut self) -> ApplicationForm {
        self.counter += 1;
        let age = self.rng.gen_range(21..68);
        let children = self.rng.gen_range(0..4);

        ApplicationForm {
            application_id: Some(format!("app_{:010}", self.counter)),
            gender: self.random_choice(&["F", "M"]).to_string(),
            car_owner: self.random_choice(&["N", "Y"]).to_string(),
            property_owner: self.random_choice(&["N", "Y"]).to_string(),
            children,
            annual_income: (self.rng.gen_range(27_000.0..900_000.0_f64) / 100.0).round() * 100.0,
            income_type: self.random_choice(INCOME_TYPES).to_string(),
            education: self.random_choice(EDUCATION).to_string(),
            marital_status: self.random_choice(MARITAL_STATUS).to_string(),
            housing_type: self.random_choice(HOUSING_TYPES).to_string(),
            age,
            work_experience: self.rng.gen_range(0..=(age - 18).min(45)),
            mobile_phone: 1,
            work_phone: i64::from(self.rng.gen_bool(0.2)),
            phone: i64::from(self.rng.gen_bool(0.3)),
            email: i64::from(self.rng.gen_bool(0.1)),
            family_members: children + self.rng.gen_range(1..3),
        }
    }

    /// Generate an application the scorer must reject (unknown category)
    fn generate_invalid(&mut self) -> ApplicationForm {
        let mut form = self.generate();
        form.housing_type = "Houseboat".to_string();
        form
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Application Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("loan.applications");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let invalid_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.05);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        invalid_rate = invalid_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, invalid_rate, delay_ms).await;
        }
    };

    let mut generator = ApplicationGenerator::new();
    let mut rng = rand::thread_rng();
    let mut invalid_count = 0;

    for i in 0..count {
        let application = if rng.gen_bool(invalid_rate) {
            invalid_count += 1;
            generator.generate_invalid()
        } else {
            generator.generate()
        };

        let payload = serde_json::to_vec(&application)?;
        client.publish(subject.to_string(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} applications ({} invalid)",
                i + 1,
                count,
                invalid_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    client.flush().await?;

    info!(
        "Completed! Published {} applications ({} invalid)",
        count, invalid_count
    );
    Ok(())
}

async fn run_dry_mode(count: u64, invalid_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = ApplicationGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let application = if rng.gen_bool(invalid_rate) {
            generator.generate_invalid()
        } else {
            generator.generate()
        };

        if (i + 1) % 10 == 0 || i == 0 {
            let json = serde_json::to_string_pretty(&application)?;
            info!("Sample application {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
