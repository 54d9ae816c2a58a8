//! Named parameter collection
//!
//! This module holds the values bound to a statement by name and turns them
//! into the positional binds the store expects. It also provides the
//! [`Arg`] pairing used to bind several parameters in one call:
//!
//! ```
//! use fty_common_db::{arg, nullable, BindCollector, BindArgs};
//!
//! let parent = 0u32;
//! let mut binds = BindCollector::new();
//! (arg("name", "ups-1"), nullable(parent != 0, "parent", parent)).bind_into(&mut binds, None);
//! assert_eq!(binds.len(), 2);
//! assert!(binds.get("parent").unwrap().is_null());
//! ```

use std::collections::HashMap;

use diesel::{
    query_builder::{BoxedSqlQuery, SqlQuery},
    sql_types,
    sqlite::Sqlite,
};

use crate::{
    error::{Error, Result},
    query_builder::CompiledSql,
    types::ToBind,
    value::BindValue,
};

/// A parameter name paired with the value to bind under it
///
/// When `is_null` is set the value is ignored and the parameter binds as NULL.
#[derive(Debug, Clone)]
pub struct Arg<'a, T> {
    /// Placeholder name without the leading colon
    pub name: &'a str,
    /// Value to bind
    pub value: T,
    /// Bind NULL instead of `value`
    pub is_null: bool,
}

/// Pair a parameter name with a value
pub fn arg<T: ToBind>(name: &str, value: T) -> Arg<'_, T> {
    Arg {
        name,
        value,
        is_null: false,
    }
}

/// Pair a parameter name with a value that binds as NULL unless `is_set`
pub fn nullable<T: ToBind>(is_set: bool, name: &str, value: T) -> Arg<'_, T> {
    Arg {
        name,
        value,
        is_null: !is_set,
    }
}

impl<T: ToBind> Arg<'_, T> {
    /// The value this argument binds
    pub fn bind_value(&self) -> BindValue {
        if self.is_null {
            BindValue::Null
        } else {
            self.value.to_bind_value()
        }
    }
}

/// One or several [`Arg`]s applied in a single call
///
/// Implemented for a lone [`Arg`], for `()` and for tuples of up to twelve
/// elements. With a `suffix`, every name is rewritten to `name_<suffix>`.
pub trait BindArgs {
    /// Store every argument into `binds`
    fn bind_into(self, binds: &mut BindCollector, suffix: Option<usize>);
}

impl BindArgs for () {
    fn bind_into(self, _binds: &mut BindCollector, _suffix: Option<usize>) {}
}

impl<T: ToBind> BindArgs for Arg<'_, T> {
    fn bind_into(self, binds: &mut BindCollector, suffix: Option<usize>) {
        let value = self.bind_value();
        match suffix {
            Some(index) => binds.set(indexed_name(self.name, index), value),
            None => binds.set(self.name, value),
        }
    }
}

macro_rules! tuple_bind_args {
    ($($name:ident),+) => {
        impl<$($name: BindArgs),+> BindArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn bind_into(self, binds: &mut BindCollector, suffix: Option<usize>) {
                let ($($name,)+) = self;
                $($name.bind_into(binds, suffix);)+
            }
        }
    };
}

tuple_bind_args!(A);
tuple_bind_args!(A, B);
tuple_bind_args!(A, B, C);
tuple_bind_args!(A, B, C, D);
tuple_bind_args!(A, B, C, D, E);
tuple_bind_args!(A, B, C, D, E, F);
tuple_bind_args!(A, B, C, D, E, F, G);
tuple_bind_args!(A, B, C, D, E, F, G, H);
tuple_bind_args!(A, B, C, D, E, F, G, H, I);
tuple_bind_args!(A, B, C, D, E, F, G, H, I, J);
tuple_bind_args!(A, B, C, D, E, F, G, H, I, J, K);
tuple_bind_args!(A, B, C, D, E, F, G, H, I, J, K, L);

/// Name of the `index`-th row's parameter in a multi-row statement
pub fn indexed_name(name: &str, index: usize) -> String {
    format!("{}_{}", name, index)
}

/// Values bound to a statement, keyed by placeholder name
#[derive(Default, Clone, Debug)]
pub struct BindCollector {
    binds: HashMap<String, BindValue>,
}

impl BindCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under `name`, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: BindValue) {
        self.binds.insert(name.into(), value);
    }

    /// Get the value bound under `name`
    pub fn get(&self, name: &str) -> Option<&BindValue> {
        self.binds.get(name)
    }

    /// Number of distinct names bound
    pub fn len(&self) -> usize {
        self.binds.len()
    }

    /// Check if nothing has been bound
    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }

    /// Forget every bound value
    pub fn clear(&mut self) {
        self.binds.clear();
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = (String, BindValue)> {
        self.binds.into_iter()
    }

    /// Values in the positional order the compiled statement expects
    ///
    /// A name referenced more than once is repeated. Fails on the first
    /// placeholder that has no value.
    pub(crate) fn ordered(&self, compiled: &CompiledSql) -> Result<Vec<BindValue>> {
        compiled
            .placeholders()
            .iter()
            .map(|name| {
                self.binds.get(name).cloned().ok_or_else(|| {
                    Error::database(format!("no value bound for parameter :{}", name))
                })
            })
            .collect()
    }
}

/// Attach positional values to a boxed raw query
pub(crate) fn bind_values<'f>(
    mut query: BoxedSqlQuery<'f, Sqlite, SqlQuery>,
    values: Vec<BindValue>,
) -> BoxedSqlQuery<'f, Sqlite, SqlQuery> {
    for value in values {
        query = match value {
            BindValue::Null => query.bind::<sql_types::Nullable<sql_types::Text>, _>(None::<String>),
            BindValue::Integer(i) => query.bind::<sql_types::BigInt, _>(i),
            BindValue::Double(d) => query.bind::<sql_types::Double, _>(d),
            BindValue::Text(s) => query.bind::<sql_types::Text, _>(s),
            BindValue::Binary(b) => query.bind::<sql_types::Binary, _>(b),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_binds_value() {
        let a = arg("id", 42i32);
        assert_eq!(a.name, "id");
        assert_eq!(a.bind_value(), BindValue::Integer(42));
    }

    #[test]
    fn test_nullable_unset_binds_null() {
        assert_eq!(nullable(false, "parent", 7u32).bind_value(), BindValue::Null);
        assert_eq!(
            nullable(true, "parent", 7u32).bind_value(),
            BindValue::Integer(7)
        );
    }

    #[test]
    fn test_tuple_bind_into() {
        let mut binds = BindCollector::new();
        (arg("a", 1i64), arg("b", "two"), arg("c", 3.0f64)).bind_into(&mut binds, None);
        assert_eq!(binds.len(), 3);
        assert_eq!(binds.get("b"), Some(&BindValue::Text("two".into())));
    }

    #[test]
    fn test_bind_into_with_suffix() {
        let mut binds = BindCollector::new();
        (arg("key", "k"), arg("value", "v")).bind_into(&mut binds, Some(3));
        assert!(binds.get("key_3").is_some());
        assert!(binds.get("value_3").is_some());
        assert!(binds.get("key").is_none());
    }

    #[test]
    fn test_unit_binds_nothing() {
        let mut binds = BindCollector::new();
        ().bind_into(&mut binds, None);
        assert!(binds.is_empty());
    }

    #[test]
    fn test_rebind_replaces() {
        let mut binds = BindCollector::new();
        binds.set("x", BindValue::Integer(1));
        binds.set("x", BindValue::Integer(2));
        assert_eq!(binds.len(), 1);
        assert_eq!(binds.get("x"), Some(&BindValue::Integer(2)));
    }

    #[test]
    fn test_ordered_repeats_names() {
        let compiled = CompiledSql::parse("SELECT :a, :b, :a");
        let mut binds = BindCollector::new();
        binds.set("a", BindValue::Integer(1));
        binds.set("b", BindValue::Text("x".into()));

        let values = binds.ordered(&compiled).unwrap();
        assert_eq!(
            values,
            vec![
                BindValue::Integer(1),
                BindValue::Text("x".into()),
                BindValue::Integer(1)
            ]
        );
    }

    #[test]
    fn test_ordered_missing_value() {
        let compiled = CompiledSql::parse("SELECT :a");
        let err = BindCollector::new().ordered(&compiled).unwrap_err();
        assert!(err.message().contains(":a"));
    }

    #[test]
    fn test_indexed_name() {
        assert_eq!(indexed_name("key", 0), "key_0");
        assert_eq!(indexed_name("value", 12), "value_12");
    }
}
