//! Route patterns and their compiled matchers.
//!
//! A pattern is a path made of literal text and two kinds of tokens:
//! ```ignore
//!  Syntax    Type
//!  {name}    named parameter
//!  *         wildcard
//! ```
//!
//! Named parameters match exactly one path segment, anything until the next
//! '/' or the path end:
//! ```ignore
//!  Pattern: /blog/{category}/{post}
//!
//!   /blog/rust/request-routers            match: category="rust", post="request-routers"
//!   /blog/rust/request-routers/           no match
//!   /blog/rust/                           no match
//!   /blog/rust/request-routers/comments   no match
//! ```
//!
//! A wildcard matches the rest of the path, '/' included. Every wildcard gets
//! its own capture name, `wildCard1`, `wildCard2` and so on in pattern order:
//! ```ignore
//!  Pattern: /files/*
//!
//!   /files/                             match: wildCard1=""
//!   /files/LICENSE                      match: wildCard1="LICENSE"
//!   /files/templates/article.html       match: wildCard1="templates/article.html"
//!   /files                              no match
//! ```
//!
//! Everything else is matched literally and the whole path must match.
use std::collections::HashSet;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::Error;
use crate::params::Params;

const WILDCARD_PREFIX: &str = "wildCard";

// Upper bound for the compiled program of a single route.
const MAX_REGEX_SIZE: usize = 1 << 20;

/// A compiled route pattern.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    names: Vec<Option<String>>,
}

impl Pattern {
    /// Compiles a route pattern.
    ///
    /// Fails with [`Error::MalformedPattern`] on an unterminated or empty
    /// `{}` token, an invalid capture name, or a capture name used twice.
    /// ```rust
    /// use httptools::Pattern;
    ///
    /// let pattern = Pattern::compile("/hello/{name}").unwrap();
    /// let params = pattern.captures("/hello/world").unwrap();
    /// assert_eq!(params.get("name"), Some("world"));
    ///
    /// assert!(Pattern::compile("/{id}/{id}").is_err());
    /// ```
    pub fn compile(pattern: &str) -> Result<Self, Error> {
        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        let mut seen = HashSet::new();
        let mut wildcards = 0;
        let mut literal = String::new();

        expr.push('^');

        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();

                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => return Err(Error::malformed(pattern, "unterminated `{`")),
                        }
                    }

                    check_name(pattern, &name)?;
                    if !seen.insert(name.clone()) {
                        return Err(Error::malformed(
                            pattern,
                            format!("capture `{}` appears more than once", name),
                        ));
                    }

                    expr.push_str("(?P<");
                    expr.push_str(&name);
                    expr.push_str(">[^/]+)");
                }
                '*' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();

                    wildcards += 1;
                    let name = format!("{}{}", WILDCARD_PREFIX, wildcards);
                    if !seen.insert(name.clone()) {
                        return Err(Error::malformed(
                            pattern,
                            format!("capture `{}` appears more than once", name),
                        ));
                    }

                    expr.push_str("(?P<");
                    expr.push_str(&name);
                    // decoded paths may hold a newline
                    expr.push_str(">(?s:.*))");
                }
                c => literal.push(c),
            }
        }

        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        let regex = RegexBuilder::new(&expr)
            .size_limit(MAX_REGEX_SIZE)
            .build()
            .map_err(|e| Error::malformed(pattern, e))?;

        Ok(Pattern::with_source(pattern.to_owned(), regex))
    }

    fn with_source(source: String, regex: Regex) -> Self {
        let names = regex
            .capture_names()
            .skip(1)
            .map(|name| name.map(str::to_owned))
            .collect();

        Pattern {
            source,
            regex,
            names,
        }
    }

    /// The pattern this matcher was built from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The capture names in order, `None` for unnamed groups.
    pub fn capture_names(&self) -> impl Iterator<Item = Option<&str>> {
        self.names.iter().map(Option::as_deref)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Matches `path` and returns the raw (still percent-encoded) captures.
    ///
    /// Every capture group of the matcher is present in the result; a group
    /// that did not participate in the match yields an empty value.
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;

        let mut params = Params::with_capacity(self.names.len());
        for (i, name) in self.names.iter().enumerate() {
            let value = caps.get(i + 1).map_or("", |m| m.as_str());
            params.push(name.as_deref(), value);
        }

        Some(params)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("source", &self.source)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

/// Precompiled regexes are used as is, unanchored unless they anchor themselves.
impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::with_source(regex.as_str().to_owned(), regex)
    }
}

fn check_name(pattern: &str, name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => return Err(Error::malformed(pattern, "empty capture name")),
    };

    if valid {
        Ok(())
    } else {
        Err(Error::malformed(
            pattern,
            format!("invalid capture name `{}`", name),
        ))
    }
}

/// Anything the router accepts as a route pattern: a raw pattern string,
/// compiled when the route is registered, or an already compiled matcher.
pub trait IntoPattern {
    fn into_pattern(self) -> Result<Pattern, Error>;
}

impl IntoPattern for &str {
    fn into_pattern(self) -> Result<Pattern, Error> {
        Pattern::compile(self)
    }
}

impl IntoPattern for String {
    fn into_pattern(self) -> Result<Pattern, Error> {
        Pattern::compile(&self)
    }
}

impl IntoPattern for &String {
    fn into_pattern(self) -> Result<Pattern, Error> {
        Pattern::compile(self)
    }
}

impl IntoPattern for Pattern {
    fn into_pattern(self) -> Result<Pattern, Error> {
        Ok(self)
    }
}

impl IntoPattern for Regex {
    fn into_pattern(self) -> Result<Pattern, Error> {
        Ok(Pattern::from(self))
    }
}
