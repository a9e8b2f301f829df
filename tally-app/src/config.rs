use tally_core::config::AppConfig;

/// Assemble the application configuration: code defaults, then `TALLY__`
/// environment overrides (`TALLY__HTTP__PORT=8080` -> `http.port`).
pub fn configure() -> AppConfig {
    let mut config = AppConfig::new();

    config.set_default("http.host", "127.0.0.1");
    config.set_default("http.port", "3040");

    // `memory` is the dev backend; set `typedb` for production.
    config.set_default("storage.backend", "memory");

    config.set_default("typedb.address", "127.0.0.1:1729");
    config.set_default("typedb.username", "admin");
    config.set_default("typedb.password", "password");
    config.set_default("typedb.tls", "false");
    config.set_default("typedb.directory-database", "tally-directory");

    config.load_env("TALLY__");
    config
}
