use std::ops::Index;
use std::slice;

use percent_encoding::percent_decode_str;

/// A single captured path parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// The capture name, `None` for unnamed groups of a precompiled regex.
    pub key: Option<String>,
    pub value: String,
}

/// The parameters captured by a matched route, in capture order.
///
/// Values can be retrieved by name:
/// ```rust
/// # use httptools::Pattern;
/// let pattern = Pattern::compile("/blog/{category}/{post}").unwrap();
/// let params = pattern.captures("/blog/rust/routers").unwrap();
///
/// assert_eq!(params.get("category"), Some("rust"));
/// ```
/// or by position, which also works for unnamed captures:
/// ```rust
/// # use httptools::Pattern;
/// # let pattern = Pattern::compile("/blog/{category}/{post}").unwrap();
/// # let params = pattern.captures("/blog/rust/routers").unwrap();
/// assert_eq!(params[1].key.as_deref(), Some("post"));
/// assert_eq!(params[1].value, "routers");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    params: Vec<Param>,
}

impl Params {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Params {
            params: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, key: Option<&str>, value: &str) {
        self.params.push(Param {
            key: key.map(str::to_owned),
            value: value.to_owned(),
        });
    }

    /// Returns the value of the first parameter registered under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key.as_deref() == Some(key))
            .map(|p| p.value.as_str())
    }

    /// Returns the value at position `index`.
    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(|p| p.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Param> {
        self.params.iter()
    }

    /// Percent-decodes every value. Returns `None` if a value does not decode to UTF-8.
    pub(crate) fn decode(self) -> Option<Params> {
        let mut params = self.params;
        for param in &mut params {
            let decoded = percent_decode_str(&param.value).decode_utf8().ok()?;
            param.value = decoded.into_owned();
        }
        Some(Params { params })
    }
}

impl Index<usize> for Params {
    type Output = Param;

    fn index(&self, index: usize) -> &Param {
        &self.params[index]
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
