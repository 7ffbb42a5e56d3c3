use super::{types::Config, ConfigError};

/// Validate configuration values serde cannot check on its own.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let glpk = &config.solver.glpk;
    if glpk.timeout_ms == 0 {
        return Err(invalid("solver.glpk.timeout_ms must be positive"));
    }
    if glpk.phase1_timeout_ms == 0 {
        return Err(invalid("solver.glpk.phase1_timeout_ms must be positive"));
    }
    if glpk.phase1_timeout_ms > glpk.timeout_ms {
        return Err(invalid(
            "solver.glpk.phase1_timeout_ms cannot exceed solver.glpk.timeout_ms",
        ));
    }
    if glpk.phase1_max_size == 0 {
        return Err(invalid("solver.glpk.phase1_max_size must be positive"));
    }
    if !(glpk.failsafe_factor >= 1.0) {
        return Err(invalid("solver.glpk.failsafe_factor must be at least 1.0"));
    }

    let degeneracy = &config.solver.degeneracy;
    for (name, value) in [
        ("similarity_threshold", degeneracy.similarity_threshold),
        ("opposition_threshold", degeneracy.opposition_threshold),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "solver.degeneracy.{} must be in (0, 1], got {}",
                name, value
            )));
        }
    }

    if config.execution.queue_capacity == 0 {
        return Err(invalid("execution.queue_capacity must be positive"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
