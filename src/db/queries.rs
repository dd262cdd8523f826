pub const UPSERT_HAZARD: &str = r#"
INSERT INTO hazards (hazard_type, severity, occurred_at, lat, lon, source, source_event_id, attributes)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (source, source_event_id) DO UPDATE
SET severity = EXCLUDED.severity,
    occurred_at = EXCLUDED.occurred_at,
    lat = EXCLUDED.lat,
    lon = EXCLUDED.lon,
    attributes = EXCLUDED.attributes
RETURNING id, (xmax = 0) AS inserted;
"#;

pub const SELECT_HAZARDS_OCCURRED_SINCE: &str = r#"
SELECT id, hazard_type, severity, occurred_at, lat, lon, source, source_event_id, attributes, created_at
FROM hazards
WHERE occurred_at >= $1
ORDER BY occurred_at DESC;
"#;

pub const SELECT_HAZARDS_CREATED_SINCE: &str = r#"
SELECT id, hazard_type, severity, occurred_at, lat, lon, source, source_event_id, attributes, created_at
FROM hazards
WHERE created_at >= $1
ORDER BY created_at DESC;
"#;

pub const INSERT_ALERT: &str = r#"
INSERT INTO alerts (user_id, hazard_id, message, created_at)
VALUES ($1, $2, $3, NOW())
ON CONFLICT (user_id, hazard_id) DO NOTHING;
"#;

pub const DELETE_ALERTS_BEFORE: &str = r#"
DELETE FROM alerts WHERE created_at < $1;
"#;

pub const SELECT_POINTS_OF_INTEREST: &str = r#"
SELECT user_id, 'saved_place'::TEXT AS kind, lat, lon FROM user_places
UNION ALL
SELECT * FROM (
    SELECT DISTINCT ON (user_id) user_id, 'live_position'::TEXT AS kind, lat, lon
    FROM user_locations
    ORDER BY user_id, updated_at DESC
) latest;
"#;

pub const SELECT_LIVE_POSITIONS: &str = r#"
SELECT DISTINCT ON (l.user_id) l.user_id, u.display_name, l.lat, l.lon, u.push_token
FROM user_locations l
JOIN users u ON u.id = l.user_id
ORDER BY l.user_id, l.updated_at DESC;
"#;

pub const SELECT_FAMILY_CONTACTS: &str = r#"
SELECT DISTINCT u.id AS user_id, u.display_name, u.push_token
FROM family_members me
JOIN family_members other ON other.family_id = me.family_id AND other.user_id <> me.user_id
JOIN users u ON u.id = other.user_id
WHERE me.user_id = $1;
"#;
