// LIMIT NULL returns every row.
pub const SELECT_SHIPMENTS: &str = r#"
SELECT id, shipment_id, destination, product, target_temperature, current_temperature,
       status, departure_date, estimated_arrival, user_id, created_at, updated_at
FROM shipments
ORDER BY created_at DESC
LIMIT $1;
"#;

pub const SELECT_SHIPMENT_TARGET_FOR_UPDATE: &str = r#"
SELECT target_temperature FROM shipments WHERE id = $1 FOR UPDATE;
"#;

pub const SELECT_READINGS: &str = r#"
SELECT id, shipment_id, temperature, recorded_at, device_id, location, is_alert
FROM temperature_logs
WHERE shipment_id = $1
ORDER BY recorded_at DESC;
"#;

pub const SELECT_LATEST_READING: &str = r#"
SELECT id, shipment_id, temperature, recorded_at, device_id, location, is_alert
FROM temperature_logs
WHERE shipment_id = $1
ORDER BY recorded_at DESC
LIMIT 1;
"#;

pub const INSERT_SHIPMENT: &str = r#"
INSERT INTO shipments (
    id, shipment_id, destination, product, target_temperature, status,
    departure_date, estimated_arrival, user_id
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
RETURNING id, shipment_id, destination, product, target_temperature, current_temperature,
          status, departure_date, estimated_arrival, user_id, created_at, updated_at;
"#;

pub const INSERT_READING: &str = r#"
INSERT INTO temperature_logs (id, shipment_id, temperature, recorded_at, device_id, location, is_alert)
VALUES ($1, $2, $3, COALESCE($4, NOW()), $5, $6, $7)
RETURNING id, shipment_id, temperature, recorded_at, device_id, location, is_alert;
"#;

pub const UPDATE_CURRENT_TEMPERATURE: &str = r#"
UPDATE shipments
SET current_temperature = $2,
    updated_at = NOW()
WHERE id = $1;
"#;

// Skipped when a newer reading already exists, so a backdated reading never
// replaces the snapshot.
pub const UPDATE_CURRENT_TEMPERATURE_FROM_READING: &str = r#"
UPDATE shipments
SET current_temperature = $2,
    updated_at = NOW()
WHERE id = $1
  AND NOT EXISTS (
      SELECT 1 FROM temperature_logs
      WHERE shipment_id = $1 AND recorded_at > $3
  );
"#;
