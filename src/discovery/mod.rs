//! Device discovery configurations
//!
//! Every asset owns a prioritised list of configurations. Each configuration
//! has a type, which brings default attributes, and may carry attributes of
//! its own that override those defaults. Lower priority values are tried
//! first; a configuration is a candidate when it is both working and enabled.
//!
//! The tables are created by [`SCHEMA`].

mod asset;
mod schema;

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::{
    batch::MultiInsert,
    bind_collector::arg,
    connection::Connection,
    error::{Error, Result},
    row::Rows,
    tracing_support::LOG_TARGET,
    types::ToBind,
    value::BindValue,
};

pub use asset::update_asset_element;
pub use schema::SCHEMA;

/// Attribute keytags mapped to their values
pub type DeviceConfiguration = BTreeMap<String, String>;

/// Configurations keyed by id, in priority order
pub type DeviceConfigurationIdList = Vec<(i64, DeviceConfiguration)>;

/// Errors raised by discovery operations
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No asset has this name
    #[error("asset '{0}' not found")]
    AssetNotFound(String),

    /// A priority list does not name each configuration exactly once
    #[error("asset '{asset}' has {expected} configurations but {actual} were given")]
    ConfigurationMismatch {
        asset: String,
        expected: usize,
        actual: usize,
    },

    /// No configuration has this id, or it belongs to another asset
    #[error("unknown configuration {0}")]
    UnknownConfiguration(i64),

    /// A configuration of the asset is absent from a priority list
    #[error("configuration {config_id} of asset '{asset}' is missing from the list")]
    MissingConfiguration { asset: String, config_id: i64 },

    /// An attribute of this configuration has an empty keytag
    #[error("configuration {0} has an attribute with an empty keytag")]
    EmptyKeytag(i64),

    /// The store failed
    #[error(transparent)]
    Db(#[from] Error),
}

/// A configuration type with what it requires
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigurationType {
    /// Type id
    pub id: i64,
    /// Display name of the type
    pub name: String,
    /// Driver the device is monitored with
    pub driver: String,
    /// Port template handed to the driver
    pub port: String,
    /// Attributes every configuration of this type starts from
    pub default_attributes: DeviceConfiguration,
    /// Security document types a configuration of this type needs
    pub document_types: Vec<String>,
}

/// Where the attributes of a configuration come from
#[derive(Clone, Copy)]
enum AttributeSource {
    Default,
    Asset,
}

impl AttributeSource {
    fn join(self) -> &'static str {
        match self {
            Self::Default => {
                "INNER JOIN t_bios_nut_configuration_default_attribute attr \
                 ON attr.id_nut_configuration_type = config.id_nut_configuration_type"
            }
            Self::Asset => {
                "INNER JOIN t_bios_nut_configuration_attribute attr \
                 ON attr.id_nut_configuration = config.id_nut_configuration"
            }
        }
    }
}

fn attributes_sql(source: AttributeSource, candidates_only: bool) -> String {
    format!(
        "SELECT config.id_nut_configuration AS id, config.priority AS priority, \
         attr.keytag AS keytag, attr.value AS value \
         FROM t_bios_nut_configuration config {} \
         WHERE config.id_asset_element = :asset_id{} \
         ORDER BY config.priority ASC, config.id_nut_configuration",
        source.join(),
        if candidates_only {
            " AND config.is_working = 1 AND config.is_enabled = 1"
        } else {
            ""
        }
    )
}

/// Look up the id of the asset called `name`
pub fn asset_id(conn: &Connection, name: &str) -> Result<i64, DiscoveryError> {
    let row = conn
        .select_row(
            "SELECT id_asset_element FROM t_bios_asset_element WHERE name = :asset_name",
            arg("asset_name", name),
        )
        .map_err(|err| match err {
            Error::NotFound(_) => DiscoveryError::AssetNotFound(name.to_string()),
            err => DiscoveryError::Db(err),
        })?;
    Ok(row.get_i64("id_asset_element")?)
}

/// The configuration to try first for an asset, if it has one
///
/// This is the working and enabled configuration with the lowest priority,
/// with its own attributes laid over the defaults of its type.
pub fn candidate_config(
    conn: &Connection,
    asset_name: &str,
) -> Result<Option<(i64, DeviceConfiguration)>, DiscoveryError> {
    Ok(candidate_config_list(conn, asset_name)?.into_iter().next())
}

/// Every working and enabled configuration of an asset, by priority
pub fn candidate_config_list(
    conn: &Connection,
    asset_name: &str,
) -> Result<DeviceConfigurationIdList, DiscoveryError> {
    config_list(conn, asset_name, true)
}

/// Every configuration of an asset, by priority
pub fn all_config_list(
    conn: &Connection,
    asset_name: &str,
) -> Result<DeviceConfigurationIdList, DiscoveryError> {
    config_list(conn, asset_name, false)
}

fn config_list(
    conn: &Connection,
    asset_name: &str,
    candidates_only: bool,
) -> Result<DeviceConfigurationIdList, DiscoveryError> {
    let asset = asset_id(conn, asset_name)?;

    let mut configs: BTreeMap<(i64, i64), DeviceConfiguration> = BTreeMap::new();
    // defaults first so asset attributes overwrite them
    for source in [AttributeSource::Default, AttributeSource::Asset] {
        let rows = conn.select(
            &attributes_sql(source, candidates_only),
            arg("asset_id", asset),
        )?;
        merge_attributes(&mut configs, &rows)?;
    }

    tracing::debug!(
        target: LOG_TARGET,
        asset = asset_name,
        candidates_only,
        configs = configs.len(),
        "configurations loaded"
    );
    Ok(configs
        .into_iter()
        .map(|((_, id), attributes)| (id, attributes))
        .collect())
}

fn merge_attributes(
    configs: &mut BTreeMap<(i64, i64), DeviceConfiguration>,
    rows: &Rows,
) -> Result<(), DiscoveryError> {
    for row in rows {
        let id = row.get_i64("id")?;
        let keytag = row.get_string("keytag")?;
        if keytag.is_empty() {
            return Err(DiscoveryError::EmptyKeytag(id));
        }
        configs
            .entry((row.get_i64("priority")?, id))
            .or_default()
            .insert(keytag, row.get_string("value")?);
    }
    Ok(())
}

/// Whether configuration `config_id` is marked as working
pub fn config_working(conn: &Connection, config_id: i64) -> Result<bool, DiscoveryError> {
    let row = conn
        .select_row(
            "SELECT is_working FROM t_bios_nut_configuration WHERE id_nut_configuration = :config_id",
            arg("config_id", config_id),
        )
        .map_err(|err| match err {
            Error::NotFound(_) => DiscoveryError::UnknownConfiguration(config_id),
            err => DiscoveryError::Db(err),
        })?;
    Ok(row.get_bool("is_working")?)
}

/// Mark configuration `config_id` as working or not
pub fn set_config_working(
    conn: &Connection,
    config_id: i64,
    working: bool,
) -> Result<(), DiscoveryError> {
    let updated = conn.execute(
        "UPDATE t_bios_nut_configuration SET is_working = :working_value \
         WHERE id_nut_configuration = :config_id",
        (arg("working_value", working), arg("config_id", config_id)),
    )?;
    if updated == 0 {
        return Err(DiscoveryError::UnknownConfiguration(config_id));
    }
    Ok(())
}

/// Reorder the configurations of an asset
///
/// `config_ids` must name every configuration of the asset exactly once. The
/// first one gets priority 0, the next 1, and so on.
pub fn modify_config_priorities(
    conn: &Connection,
    asset_name: &str,
    config_ids: &[i64],
) -> Result<(), DiscoveryError> {
    let tx = conn.transaction()?;
    let asset = asset_id(&tx, asset_name)?;

    let rows = tx.select(
        "SELECT id_nut_configuration AS id, priority FROM t_bios_nut_configuration \
         WHERE id_asset_element = :asset_id",
        arg("asset_id", asset),
    )?;
    let mut existing = HashSet::with_capacity(rows.len());
    let mut max_priority = -1i64;
    for row in &rows {
        existing.insert(row.get_i64("id")?);
        max_priority = max_priority.max(row.get_i64("priority")?);
    }

    if let Some(unknown) = config_ids.iter().find(|id| !existing.contains(*id)) {
        return Err(DiscoveryError::UnknownConfiguration(*unknown));
    }
    let listed: HashSet<i64> = config_ids.iter().copied().collect();
    if let Some(missing) = existing.iter().find(|id| !listed.contains(*id)) {
        return Err(DiscoveryError::MissingConfiguration {
            asset: asset_name.to_string(),
            config_id: *missing,
        });
    }
    if config_ids.len() != existing.len() {
        return Err(DiscoveryError::ConfigurationMismatch {
            asset: asset_name.to_string(),
            expected: existing.len(),
            actual: config_ids.len(),
        });
    }
    if config_ids.is_empty() {
        tx.commit()?;
        return Ok(());
    }

    // move everything above the current range first so no two
    // configurations ever share a priority, then shift back to 0
    let offset = max_priority + 1;
    let mut statement = tx.prepare(
        "UPDATE t_bios_nut_configuration SET priority = :priority \
         WHERE id_nut_configuration = :config_id",
    )?;
    for (position, id) in (0i64..).zip(config_ids) {
        statement
            .bind("priority", offset + position)
            .bind("config_id", *id)
            .execute()?;
    }
    tx.execute(
        "UPDATE t_bios_nut_configuration SET priority = priority - :offset \
         WHERE id_asset_element = :asset_id",
        (arg("offset", offset), arg("asset_id", asset)),
    )?;
    tx.commit()?;

    tracing::info!(
        target: LOG_TARGET,
        asset = asset_name,
        configs = config_ids.len(),
        "configuration priorities updated"
    );
    Ok(())
}

/// Add a configuration to an asset, returning its id
///
/// The configuration goes after every existing one. Attributes whose keytag
/// is already set on it are skipped.
pub fn insert_config(
    conn: &Connection,
    asset_name: &str,
    config_type: i64,
    is_working: bool,
    is_enabled: bool,
    attributes: &DeviceConfiguration,
) -> Result<i64, DiscoveryError> {
    let tx = conn.transaction()?;
    let asset = asset_id(&tx, asset_name)?;

    let max_priority = tx
        .select_row(
            "SELECT MAX(priority) AS max_priority FROM t_bios_nut_configuration \
             WHERE id_asset_element = :asset_id",
            arg("asset_id", asset),
        )?
        .get_opt::<i64, _>("max_priority")?
        .unwrap_or(-1);

    tx.execute(
        "INSERT INTO t_bios_nut_configuration \
         (id_nut_configuration_type, id_asset_element, priority, is_enabled, is_working) \
         VALUES (:config_type, :asset_id, :priority, :is_enabled, :is_working)",
        (
            arg("config_type", config_type),
            arg("asset_id", asset),
            arg("priority", max_priority + 1),
            arg("is_enabled", is_enabled),
            arg("is_working", is_working),
        ),
    )?;
    let config_id = tx.last_insert_id()?;

    let mut insert = MultiInsert::new(
        "t_bios_nut_configuration_attribute",
        &["id_nut_configuration", "keytag", "value"],
    )
    .or_ignore();
    for (keytag, value) in attributes {
        if keytag.is_empty() {
            return Err(DiscoveryError::EmptyKeytag(config_id));
        }
        insert.add_row([
            BindValue::Integer(config_id),
            keytag.to_bind_value(),
            value.to_bind_value(),
        ])?;
    }
    insert.execute(&tx)?;
    tx.commit()?;

    tracing::info!(
        target: LOG_TARGET,
        asset = asset_name,
        config_id,
        priority = max_priority + 1,
        "configuration inserted"
    );
    Ok(config_id)
}

/// Delete a configuration with its attributes and document links
pub fn remove_config(conn: &Connection, config_id: i64) -> Result<(), DiscoveryError> {
    let tx = conn.transaction()?;
    for table in [
        "t_bios_nut_configuration_secw_document",
        "t_bios_nut_configuration_attribute",
    ] {
        tx.execute(
            &format!("DELETE FROM {} WHERE id_nut_configuration = :config_id", table),
            arg("config_id", config_id),
        )?;
    }
    let removed = tx.execute(
        "DELETE FROM t_bios_nut_configuration WHERE id_nut_configuration = :config_id",
        arg("config_id", config_id),
    )?;
    if removed == 0 {
        return Err(DiscoveryError::UnknownConfiguration(config_id));
    }
    tx.commit()?;

    tracing::info!(target: LOG_TARGET, config_id, "configuration removed");
    Ok(())
}

/// Every configuration type with its default attributes and document needs
pub fn configuration_types(conn: &Connection) -> Result<Vec<ConfigurationType>, DiscoveryError> {
    let types = conn.select(
        "SELECT id_nut_configuration_type AS id, configuration_name, driver, port \
         FROM t_bios_nut_configuration_type ORDER BY id_nut_configuration_type",
        (),
    )?;

    let mut result = Vec::with_capacity(types.len());
    for row in &types {
        let id = row.get_i64("id")?;

        let mut default_attributes = DeviceConfiguration::new();
        for attr in &conn.select(
            "SELECT keytag, value FROM t_bios_nut_configuration_default_attribute \
             WHERE id_nut_configuration_type = :type_id",
            arg("type_id", id),
        )? {
            default_attributes.insert(attr.get_string("keytag")?, attr.get_string("value")?);
        }

        let document_types = conn
            .select(
                "SELECT id_secw_document_type \
                 FROM t_bios_nut_configuration_type_secw_document_type_requirements \
                 WHERE id_nut_configuration_type = :type_id \
                 ORDER BY id_secw_document_type",
                arg("type_id", id),
            )?
            .iter()
            .map(|doc| doc.get_string("id_secw_document_type"))
            .collect::<Result<Vec<_>>>()?;

        result.push(ConfigurationType {
            id,
            name: row.get_string("configuration_name")?,
            driver: row.get_string("driver")?,
            port: row.get_string("port")?,
            default_attributes,
            document_types,
        });
    }
    Ok(result)
}
