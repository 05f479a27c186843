//! Relational schema for both backends
//!
//! Dates are ISO `YYYY-MM-DD`, draw times are `HH:MM` text so that the
//! identity index can coalesce a missing time to the empty string.

/// SQLite schema
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS states (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    logo_ref TEXT,
    is_multi_jurisdiction INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS state_games (
    game_id INTEGER NOT NULL REFERENCES games(id),
    state_id INTEGER NOT NULL REFERENCES states(id),
    PRIMARY KEY (game_id, state_id)
);

CREATE TABLE IF NOT EXISTS game_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(id),
    draw_date TEXT NOT NULL,
    draw_time TEXT,
    timezone_offset TEXT,
    numbers TEXT NOT NULL DEFAULT '[]',
    special_number TEXT,
    jackpot TEXT,
    next_draw_date TEXT,
    next_draw_time TEXT,
    next_jackpot TEXT,
    collected_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_game_results_identity
    ON game_results(game_id, draw_date, COALESCE(draw_time, ''));

CREATE INDEX IF NOT EXISTS idx_game_results_draw_date
    ON game_results(draw_date);

CREATE TABLE IF NOT EXISTS collection_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    state_code TEXT NOT NULL,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    games_collected INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_collection_log_state
    ON collection_log(state_code);
"#;

/// PostgreSQL schema
pub const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS states (
    id BIGSERIAL PRIMARY KEY,
    code VARCHAR(8) NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS games (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    logo_ref TEXT,
    is_multi_jurisdiction BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS state_games (
    game_id BIGINT NOT NULL REFERENCES games(id),
    state_id BIGINT NOT NULL REFERENCES states(id),
    PRIMARY KEY (game_id, state_id)
);

CREATE TABLE IF NOT EXISTS game_results (
    id BIGSERIAL PRIMARY KEY,
    game_id BIGINT NOT NULL REFERENCES games(id),
    draw_date DATE NOT NULL,
    draw_time VARCHAR(5),
    timezone_offset VARCHAR(8),
    numbers TEXT NOT NULL DEFAULT '[]',
    special_number TEXT,
    jackpot TEXT,
    next_draw_date DATE,
    next_draw_time VARCHAR(5),
    next_jackpot TEXT,
    collected_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_game_results_identity
    ON game_results(game_id, draw_date, COALESCE(draw_time, ''));

CREATE INDEX IF NOT EXISTS idx_game_results_draw_date
    ON game_results(draw_date);

CREATE TABLE IF NOT EXISTS collection_log (
    id BIGSERIAL PRIMARY KEY,
    state_code VARCHAR(8) NOT NULL,
    url TEXT NOT NULL,
    status VARCHAR(16) NOT NULL,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ,
    games_collected INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_collection_log_state
    ON collection_log(state_code);
"#;
