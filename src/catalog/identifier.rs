/*!
Defining the [TableIdentifier] struct for identifying tables in a catalog,
together with its [Namespace]. Identifiers never carry a catalog prefix;
the catalog a table belongs to is implied by the client the identifier is
used with.
*/

use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator of namespace levels in the string form.
pub static SEPARATOR: &str = ".";

/// A single namespace level or table name must be non-empty and must
/// not contain the separator, so the string form parses back to the
/// same identifier.
fn check_part(kind: &str, part: &str) -> Result<()> {
    if part.is_empty() {
        return Err(Error::Invalid(format!("{kind} cannot be empty")));
    }
    if part.contains(SEPARATOR) {
        return Err(Error::Invalid(format!(
            "{kind} {part} cannot contain {SEPARATOR}"
        )));
    }
    Ok(())
}

/// Namespace of a table, a sequence of non-empty levels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace {
    levels: Vec<String>,
}

impl Namespace {
    /// Try to create a namespace from a sequence of levels.
    pub fn try_new(levels: &[String]) -> Result<Self> {
        for level in levels {
            check_part("namespace level", level)?;
        }
        Ok(Namespace {
            levels: levels.to_vec(),
        })
    }
    /// The empty namespace.
    pub fn empty() -> Self {
        Namespace { levels: vec![] }
    }
    /// The namespace levels.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }
    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }
    /// True for the empty namespace.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.levels.join(SEPARATOR))
    }
}

/// Identifies a table within a catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIdentifier {
    namespace: Namespace,
    name: String,
}

impl TableIdentifier {
    /// Create an identifier from namespace levels followed by the table name.
    pub fn try_new(names: &[String]) -> Result<Self> {
        let (name, namespace) = names.split_last().ok_or_else(|| {
            Error::Invalid("cannot create a table identifier from an empty sequence".to_string())
        })?;
        check_part("table name", name)?;
        Ok(TableIdentifier {
            namespace: Namespace::try_new(namespace)?,
            name: name.clone(),
        })
    }
    /// Parse a dotted identifier string.
    pub fn parse(identifier: &str) -> Result<Self> {
        let names = identifier
            .split(SEPARATOR)
            .map(ToString::to_string)
            .collect::<Vec<String>>();
        TableIdentifier::try_new(&names)
    }
    /// Namespace of the table.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
    /// Name of the table.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{}{}", self.namespace, SEPARATOR, self.name)
        }
    }
}
