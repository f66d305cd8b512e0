use sqlx::Executor;
use tracing::info;

use crate::db::DbPool;
use crate::error::MonitorResult;

pub const READINGS_CHANNEL: &str = "temperature_logs_changes";
pub const SHIPMENTS_CHANNEL: &str = "shipments_changes";

/// Tables plus the triggers that publish row changes on the notify channels.
/// Every statement is idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS shipments (
    id                  UUID PRIMARY KEY,
    shipment_id         TEXT NOT NULL UNIQUE,
    destination         TEXT NOT NULL,
    product             TEXT NOT NULL,
    target_temperature  DOUBLE PRECISION NOT NULL,
    current_temperature DOUBLE PRECISION,
    status              TEXT NOT NULL CHECK (status IN ('Scheduled', 'In Transit', 'Delayed', 'Delivered', 'Cancelled')),
    departure_date      TIMESTAMPTZ NOT NULL,
    estimated_arrival   TIMESTAMPTZ,
    user_id             UUID NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS temperature_logs (
    id          UUID PRIMARY KEY,
    shipment_id UUID NOT NULL REFERENCES shipments (id),
    temperature DOUBLE PRECISION NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    device_id   TEXT,
    location    TEXT,
    is_alert    BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS temperature_logs_shipment_recorded_idx
    ON temperature_logs (shipment_id, recorded_at DESC);

CREATE OR REPLACE FUNCTION coldchain_notify_change() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify(
        TG_TABLE_NAME || '_changes',
        json_build_object(
            'table', TG_TABLE_NAME,
            'type', TG_OP,
            'record', row_to_json(NEW),
            'old_record', CASE WHEN TG_OP = 'UPDATE' THEN row_to_json(OLD) ELSE NULL END
        )::text
    );
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS temperature_logs_notify ON temperature_logs;
CREATE TRIGGER temperature_logs_notify
    AFTER INSERT ON temperature_logs
    FOR EACH ROW EXECUTE FUNCTION coldchain_notify_change();

DROP TRIGGER IF EXISTS shipments_notify ON shipments;
CREATE TRIGGER shipments_notify
    AFTER UPDATE ON shipments
    FOR EACH ROW EXECUTE FUNCTION coldchain_notify_change();
"#;

pub async fn apply_schema(pool: &DbPool) -> MonitorResult<()> {
    // simple query protocol, so the multi-statement script runs as one call
    pool.execute(SCHEMA).await?;
    info!("Schema bootstrap applied");
    Ok(())
}
