//! Dialect strategies.
//!
//! Everything that differs between backends when assembling a statement lives
//! behind [`Dialect`]: identifier quoting, placeholder syntax, paging and the
//! trailing clause used to read back an inserted identity. Clause ordering and
//! connector precedence never depend on the dialect.

use std::borrow::Cow;
use std::fmt;

/// Words that are quoted when used as an identifier (or one part of a dotted
/// identifier). Matching is case-sensitive.
pub const RESERVED_WORDS: &[&str] = &[
    "select", "insert", "delete", "update", "where", "table", "join", "order", "read", "check",
];

/// How bound parameters are referenced in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// `?` for every parameter
    Positional,
    /// `$1`, `$2`, ...
    Numbered,
    /// `@name`; every parameter carries a name
    Named,
}

/// Backend kind, as named in connection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DialectKind {
    #[cfg_attr(feature = "serde", serde(alias = "MySQL"))]
    MySql,
    #[cfg_attr(feature = "serde", serde(alias = "mssql", alias = "SQLServer"))]
    SqlServer,
    #[cfg_attr(feature = "serde", serde(alias = "postgresql"))]
    Postgres,
    Sqlite,
}

impl DialectKind {
    pub const ALL: &'static [DialectKind] = &[
        DialectKind::MySql,
        DialectKind::SqlServer,
        DialectKind::Postgres,
        DialectKind::Sqlite,
    ];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::SqlServer => "sqlserver",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// The built-in strategy for this kind.
    #[inline]
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            Self::MySql => &MySql,
            Self::SqlServer => &SqlServer,
            Self::Postgres => &Postgres,
            Self::Sqlite => &Sqlite,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown database kind '{other}'")),
        }
    }
}

/// Per-backend rendering strategy.
pub trait Dialect: fmt::Debug + Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Quotes an identifier if it (or any dot-separated part of it) is reserved.
    fn quote_identifier<'a>(&self, ident: &'a str) -> Cow<'a, str>;

    fn binding(&self) -> Binding;

    /// Renders the placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize, name: Option<&str>) -> Cow<'static, str>;

    /// Prefix for generated parameter names, for dialects with named binding.
    fn default_param_prefix(&self) -> Option<&'static str> {
        None
    }

    /// Paging clause for a statement. `ordered` reports whether the statement
    /// already carries an ORDER BY.
    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, ordered: bool)
    -> Option<String>;

    /// Clause appended to an INSERT to read back the last generated identity.
    fn last_insert_id_clause(&self) -> Option<&'static str> {
        None
    }
}

/// Applies `wrap` to every reserved part of a (possibly dotted) identifier.
pub fn quote_reserved<'a>(ident: &'a str, wrap: impl Fn(&str) -> String) -> Cow<'a, str> {
    let is_reserved = |part: &str| RESERVED_WORDS.contains(&part);
    if !ident.split('.').any(is_reserved) {
        return Cow::Borrowed(ident);
    }
    let parts: Vec<String> = ident
        .split('.')
        .map(|part| {
            if is_reserved(part) {
                wrap(part)
            } else {
                part.to_string()
            }
        })
        .collect();
    Cow::Owned(parts.join("."))
}

/// `LIMIT n [OFFSET m]`; the offset is only emitted together with a limit.
fn limit_offset(limit: Option<u64>, offset: Option<u64>) -> Option<String> {
    let limit = limit.filter(|l| *l > 0)?;
    match offset.filter(|o| *o > 0) {
        Some(offset) => Some(format!("LIMIT {limit} OFFSET {offset}")),
        None => Some(format!("LIMIT {limit}")),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn quote_identifier<'a>(&self, ident: &'a str) -> Cow<'a, str> {
        quote_reserved(ident, |part| format!("`{part}`"))
    }

    fn binding(&self) -> Binding {
        Binding::Positional
    }

    #[inline]
    fn placeholder(&self, _index: usize, _name: Option<&str>) -> Cow<'static, str> {
        Cow::Borrowed("?")
    }

    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, _ordered: bool) -> Option<String> {
        limit_offset(limit, offset)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl Dialect for SqlServer {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn quote_identifier<'a>(&self, ident: &'a str) -> Cow<'a, str> {
        quote_reserved(ident, |part| format!("[{part}]"))
    }

    fn binding(&self) -> Binding {
        Binding::Named
    }

    fn placeholder(&self, index: usize, name: Option<&str>) -> Cow<'static, str> {
        match name {
            Some(name) => Cow::Owned(format!("@{name}")),
            None => Cow::Owned(format!("@p{index}")),
        }
    }

    fn default_param_prefix(&self) -> Option<&'static str> {
        Some("param")
    }

    /// `OFFSET .. FETCH` is only valid after an ORDER BY, so an unordered
    /// statement gets a neutral one.
    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, ordered: bool) -> Option<String> {
        let limit = limit.filter(|l| *l > 0)?;
        let offset = offset.unwrap_or(0);
        let fetch = format!("OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY");
        if ordered {
            Some(fetch)
        } else {
            Some(format!("ORDER BY (SELECT NULL) {fetch}"))
        }
    }

    fn last_insert_id_clause(&self) -> Option<&'static str> {
        Some("; SELECT ISNULL(SCOPE_IDENTITY(), -1);")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn quote_identifier<'a>(&self, ident: &'a str) -> Cow<'a, str> {
        quote_reserved(ident, |part| format!("\"{part}\""))
    }

    fn binding(&self) -> Binding {
        Binding::Numbered
    }

    #[inline]
    fn placeholder(&self, index: usize, _name: Option<&str>) -> Cow<'static, str> {
        Cow::Owned(format!("${index}"))
    }

    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, _ordered: bool) -> Option<String> {
        limit_offset(limit, offset)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_identifier<'a>(&self, ident: &'a str) -> Cow<'a, str> {
        quote_reserved(ident, |part| format!("\"{part}\""))
    }

    fn binding(&self) -> Binding {
        Binding::Positional
    }

    #[inline]
    fn placeholder(&self, _index: usize, _name: Option<&str>) -> Cow<'static, str> {
        Cow::Borrowed("?")
    }

    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, _ordered: bool) -> Option<String> {
        limit_offset(limit, offset)
    }
}
