pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS raw_telegram_messages (
        id INTEGER PRIMARY KEY,
        channel_id INTEGER NOT NULL,
        message_date TEXT NOT NULL,
        raw_data TEXT NOT NULL CHECK (json_valid(raw_data)),
        load_timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS raw_image_detections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id INTEGER NOT NULL,
        image_path TEXT NOT NULL,
        detected_object_class TEXT NOT NULL,
        confidence_score REAL NOT NULL,
        detection_timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE (message_id, image_path, detected_object_class)
    );

    CREATE INDEX IF NOT EXISTS idx_raw_image_detections_message_id
        ON raw_image_detections (message_id);
";
