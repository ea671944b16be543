//! SQLite bootstrap: connection helper, pragma tuning, and schema creation.
//!
//! Every module that needs persistence opens its own short-lived
//! `Connection` via [`open_conn`] rather than sharing one handle; WAL mode
//! makes that cheap and lets reads and writes interleave across tasks.

use dirs::data_dir;
use rusqlite::Connection;
use std::path::PathBuf;

pub fn db_path() -> PathBuf {
    if let Ok(p) = std::env::var("RELAY_GATEWAY_DB_PATH") {
        return PathBuf::from(p);
    }
    let mut p = data_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("relay-gateway");
    std::fs::create_dir_all(&p).ok();
    p.push("gateway.db");
    p
}

pub fn open_conn() -> Connection {
    let conn = Connection::open(db_path()).unwrap();
    optimize_connection(&conn);
    conn
}

fn optimize_connection(conn: &Connection) {
    conn.pragma_update(None, "journal_mode", &"WAL").ok();
    conn.pragma_update(None, "synchronous", &"NORMAL").ok();
    conn.pragma_update(None, "cache_size", &"-64000").ok();
    conn.pragma_update(None, "temp_store", &"MEMORY").ok();
    conn.pragma_update(None, "foreign_keys", &"ON").ok();
}

/// Create every table the gateway and its local reference collaborators
/// need. Idempotent; called once at process start from `bin/server_main.rs`.
pub fn init() {
    let conn = open_conn();

    conn.execute(
        "create table if not exists users (
            id text primary key,
            name text not null,
            email text unique,
            password_hash text,
            role text not null default 'user',
            plan text not null default 'free',
            created_at integer not null
        )",
        [],
    )
    .unwrap();
    conn.execute(
        "create index if not exists idx_users_email on users(email)",
        [],
    )
    .ok();

    conn.execute(
        "create table if not exists device_bindings (
            user_id text not null,
            device_id text not null,
            device_name text not null,
            platform text not null,
            refresh_token_hash text not null,
            created_at integer not null,
            last_used_at integer not null,
            primary key (user_id, device_id)
        )",
        [],
    )
    .unwrap();
    conn.execute(
        "create index if not exists idx_device_bindings_hash on device_bindings(refresh_token_hash)",
        [],
    )
    .ok();

    conn.execute(
        "create table if not exists device_code_grants (
            device_code text primary key,
            user_code text not null,
            device_id text not null,
            device_name text not null,
            platform text not null,
            state text not null,
            authorized_user_id text,
            interval_secs integer not null,
            last_polled_at integer,
            expires_at integer not null,
            created_at integer not null
        )",
        [],
    )
    .unwrap();
    conn.execute(
        "create unique index if not exists idx_device_code_grants_user_code on device_code_grants(user_code)",
        [],
    )
    .ok();

    conn.execute(
        "create table if not exists admin_api_keys (
            provider text primary key,
            nonce blob not null,
            ciphertext blob not null,
            is_active integer not null default 1,
            usage_count integer not null default 0,
            last_used_at integer
        )",
        [],
    )
    .unwrap();

    conn.execute(
        "create table if not exists usage_logs (
            id integer primary key autoincrement,
            timestamp integer not null,
            user_id text not null,
            action text not null,
            provider text,
            model text,
            prompt_tokens integer not null default 0,
            completion_tokens integer not null default 0,
            total_tokens integer not null default 0,
            price_usd real not null default 0
        )",
        [],
    )
    .unwrap();
    conn.execute(
        "create index if not exists idx_usage_logs_user_action_time on usage_logs(user_id, action, timestamp desc)",
        [],
    )
    .ok();

    conn.execute(
        "create table if not exists usage_daily (bucket text not null, user_id text not null, requests integer not null default 0, tokens integer not null default 0, price_usd real not null default 0, primary key (bucket, user_id))",
        [],
    )
    .ok();
    conn.execute(
        "create table if not exists usage_weekly (bucket text not null, user_id text not null, requests integer not null default 0, tokens integer not null default 0, price_usd real not null default 0, primary key (bucket, user_id))",
        [],
    )
    .ok();
    conn.execute(
        "create table if not exists usage_monthly (bucket text not null, user_id text not null, requests integer not null default 0, tokens integer not null default 0, price_usd real not null default 0, primary key (bucket, user_id))",
        [],
    )
    .ok();

    conn.execute(
        "create table if not exists knowledge_atoms (
            id text primary key,
            user_id text not null,
            kind text not null,
            content text not null,
            usage_count integer not null default 0,
            helpful_count integer not null default 0,
            created_at integer not null
        )",
        [],
    )
    .unwrap();
    conn.execute(
        "create index if not exists idx_knowledge_atoms_user on knowledge_atoms(user_id)",
        [],
    )
    .ok();

    conn.execute(
        "create table if not exists transcription_tokens (
            token text primary key,
            user_id text not null,
            provider text not null,
            expires_at integer not null
        )",
        [],
    )
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_honors_env_override() {
        std::env::set_var("RELAY_GATEWAY_DB_PATH", "/tmp/relay-gateway-test-path.db");
        assert_eq!(db_path(), PathBuf::from("/tmp/relay-gateway-test-path.db"));
        std::env::remove_var("RELAY_GATEWAY_DB_PATH");
    }
}
