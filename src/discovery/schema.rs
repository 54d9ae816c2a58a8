//! Tables backing discovery configurations

/// DDL creating every table the discovery operations read and write
///
/// Safe to run on an existing database: each table is created only when
/// missing.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS t_bios_asset_element (
    id_asset_element INTEGER PRIMARY KEY AUTOINCREMENT,
    name             TEXT    NOT NULL UNIQUE,
    id_type          INTEGER NOT NULL DEFAULT 0,
    id_subtype       INTEGER NOT NULL DEFAULT 0,
    id_parent        INTEGER NULL REFERENCES t_bios_asset_element (id_asset_element),
    status           TEXT    NOT NULL DEFAULT 'nonactive',
    priority         INTEGER NOT NULL DEFAULT 5,
    asset_tag        TEXT    NULL
);

CREATE TABLE IF NOT EXISTS t_bios_nut_configuration_type (
    id_nut_configuration_type INTEGER PRIMARY KEY AUTOINCREMENT,
    configuration_name        TEXT NOT NULL UNIQUE,
    driver                    TEXT NOT NULL,
    port                      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS t_bios_nut_configuration (
    id_nut_configuration      INTEGER PRIMARY KEY AUTOINCREMENT,
    id_nut_configuration_type INTEGER NOT NULL
        REFERENCES t_bios_nut_configuration_type (id_nut_configuration_type),
    id_asset_element          INTEGER NOT NULL
        REFERENCES t_bios_asset_element (id_asset_element),
    priority                  INTEGER NOT NULL DEFAULT 0,
    is_enabled                INTEGER NOT NULL DEFAULT 0,
    is_working                INTEGER NOT NULL DEFAULT 0,
    UNIQUE (id_asset_element, priority)
);

CREATE TABLE IF NOT EXISTS t_bios_nut_configuration_attribute (
    id_nut_configuration INTEGER NOT NULL
        REFERENCES t_bios_nut_configuration (id_nut_configuration),
    keytag               TEXT NOT NULL,
    value                TEXT NOT NULL,
    PRIMARY KEY (id_nut_configuration, keytag)
);

CREATE TABLE IF NOT EXISTS t_bios_nut_configuration_default_attribute (
    id_nut_configuration_type INTEGER NOT NULL
        REFERENCES t_bios_nut_configuration_type (id_nut_configuration_type),
    keytag                    TEXT NOT NULL,
    value                     TEXT NOT NULL,
    PRIMARY KEY (id_nut_configuration_type, keytag)
);

CREATE TABLE IF NOT EXISTS t_bios_secw_document_type (
    id_secw_document_type TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS t_bios_secw_document (
    id_secw_document      TEXT PRIMARY KEY,
    id_secw_document_type TEXT NOT NULL
        REFERENCES t_bios_secw_document_type (id_secw_document_type)
);

CREATE TABLE IF NOT EXISTS t_bios_nut_configuration_secw_document (
    id_nut_configuration INTEGER NOT NULL
        REFERENCES t_bios_nut_configuration (id_nut_configuration),
    id_secw_document     TEXT NOT NULL
        REFERENCES t_bios_secw_document (id_secw_document),
    PRIMARY KEY (id_nut_configuration, id_secw_document)
);

CREATE TABLE IF NOT EXISTS t_bios_nut_configuration_type_secw_document_type_requirements (
    id_nut_configuration_type INTEGER NOT NULL
        REFERENCES t_bios_nut_configuration_type (id_nut_configuration_type),
    id_secw_document_type     TEXT NOT NULL
        REFERENCES t_bios_secw_document_type (id_secw_document_type),
    PRIMARY KEY (id_nut_configuration_type, id_secw_document_type)
);
"#;
