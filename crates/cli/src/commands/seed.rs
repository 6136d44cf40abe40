use crate::commands::{load_config, runtime, to_data, CommandResult};
use mystyle_db::{
    clear_catalog, connect_from_config, migrations, seed_demo_catalog, SqlItemRepository,
};

/// Upserts the demo catalog. With `reset` the catalog (and its event buckets)
/// is emptied first, which also zeroes every popularity score.
pub fn run(reset: bool) -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let cleared = if reset {
            clear_catalog(&pool)
                .await
                .map_err(|error| ("seed_reset", error.to_string(), 6u8))?
        } else {
            0
        };
        let mut seeded = seed_demo_catalog(&SqlItemRepository::new(pool.clone()))
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        seeded.reset = reset;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>((seeded, cleared))
    });

    match result {
        Ok((seeded, cleared)) => {
            let message = if reset {
                format!(
                    "removed {cleared} items and seeded {} demo items",
                    seeded.items_seeded.len()
                )
            } else {
                format!("seeded {} demo items", seeded.items_seeded.len())
            };
            CommandResult::success_with_data("seed", message, to_data(&seeded))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
