use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use hedge::{ConnectionConfig, ConnectionRegistry, Connections, DialectKind, HedgeError};

const CONFIG: &str = r#"
    [databases.reporting]
    kind = "postgresql"
    host = "replica.internal"
    user = "reader"
    password = "secret"
    database = "reports"

    [databases.legacy]
    kind = "mssql"
    host = "legacy.internal"
    port = 14330
    database = "erp"

    [databases.local]
    kind = "sqlite"
    database = "./dev.db"

    [fetch]
    replicas = 5
    statement_timeout_ms = 1500
"#;

#[test]
fn test_parse_config() {
    let connections = Connections::from_toml_str(CONFIG).unwrap();
    assert_eq!(
        connections.names().collect::<Vec<_>>(),
        ["legacy", "local", "reporting"]
    );

    let reporting = connections.get("reporting").unwrap();
    assert_eq!(reporting.kind, DialectKind::Postgres);
    assert_eq!(reporting.username, "reader");
    assert_eq!(
        reporting.connection_string(),
        "host=replica.internal port=5432 user=reader password=secret dbname=reports"
    );

    let legacy = connections.get("legacy").unwrap();
    assert_eq!(legacy.kind, DialectKind::SqlServer);
    assert_eq!(legacy.effective_port(), 14330);

    assert_eq!(connections.get("local").unwrap().connection_string(), "./dev.db");

    let fetch = connections.fetch_options();
    assert_eq!(fetch.replicas, 5);
    assert_eq!(fetch.statement_timeout, Duration::from_millis(1500));
    assert_eq!(fetch.fan_out_deadline, Duration::from_millis(100));
}

#[test]
fn test_defaults() {
    let connections = Connections::from_toml_str("").unwrap();
    assert_eq!(connections.names().count(), 0);
    let fetch = connections.fetch_options();
    assert_eq!(fetch.replicas, 3);
    assert_eq!(fetch.statement_timeout, Duration::from_secs(60));
    assert_eq!(fetch.fan_out_deadline, Duration::from_millis(100));
}

#[test]
fn test_invalid_config() {
    let zero_replicas = Connections::from_toml_str("[fetch]\nreplicas = 0");
    assert!(matches!(zero_replicas, Err(HedgeError::Config(_))));

    let unknown_kind = Connections::from_toml_str("[databases.x]\nkind = \"oracle\"");
    assert!(matches!(unknown_kind, Err(HedgeError::Config(_))));

    let sqlite_without_path = Connections::from_toml_str("[databases.x]\nkind = \"sqlite\"");
    assert!(matches!(sqlite_without_path, Err(HedgeError::Config(_))));
}

#[test]
fn test_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let connections = Connections::from_path(file.path()).unwrap();
    assert!(connections.get("local").is_ok());

    let missing = Connections::from_path("/definitely/not/here/hedge.toml");
    assert!(matches!(missing, Err(HedgeError::Config(ref m)) if m.contains("not found")));
}

#[test]
fn test_registry_resolution() {
    let connections = Connections::new()
        .insert("app", ConnectionConfig::new(DialectKind::MySql, "app"));
    let registry = Arc::new(ConnectionRegistry::new(connections));

    assert!(matches!(
        registry.open("missing"),
        Err(HedgeError::UnknownDatabase(ref name)) if name == "missing"
    ));
    assert!(matches!(
        registry.open("app"),
        Err(HedgeError::NoDriver(DialectKind::MySql))
    ));
}
