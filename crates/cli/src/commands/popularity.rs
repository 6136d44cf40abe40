use mystyle_core::ItemId;

use crate::commands::{load_config, open_application, runtime, to_data, CommandResult};

pub fn run(item_id: &str) -> CommandResult {
    let config = match load_config("popularity") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("popularity") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let app = match open_application("popularity", config).await {
            Ok(app) => app,
            Err(failure) => return failure,
        };
        let result = app.engine.get_popularity_summary(&ItemId(item_id.to_string())).await;
        app.db_pool.close().await;

        match result {
            Ok(summary) => CommandResult::success_with_data(
                "popularity",
                format!("item `{}` scores {}", summary.item_id, summary.score),
                to_data(&summary),
            ),
            Err(error) => {
                let (error_class, exit_code) = match error {
                    mystyle_core::EngineError::NotFound { .. } => ("not_found", 8),
                    mystyle_core::EngineError::MalformedInput(_) => ("invalid_input", 2),
                    _ => ("engine", 7),
                };
                CommandResult::failure("popularity", error_class, error.to_string(), exit_code)
            }
        }
    })
}
