use std::borrow::Cow;

/// SQL syntax family a statement is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// The local file database (`SQLite`).
    Embedded,
    /// The networked database (`PostgreSQL`).
    Networked,
}

/// Token pairs rewritten between dialects, as `(embedded, networked)`.
///
/// Order matters: longer tokens that contain shorter ones must come first.
pub const DIALECT_TOKENS: &[(&str, &str)] = &[
    ("datetime('NOW', 'localtime')", "NOW()"),
    ("INTEGER PRIMARY KEY AUTOINCREMENT", "SERIAL PRIMARY KEY"),
    ("integer primary key autoincrement", "serial primary key"),
];

impl Dialect {
    /// Tokens written in this dialect, in table order.
    #[must_use]
    pub fn tokens(self) -> Vec<&'static str> {
        DIALECT_TOKENS
            .iter()
            .map(|(embedded, networked)| match self {
                Dialect::Embedded => *embedded,
                Dialect::Networked => *networked,
            })
            .collect()
    }
}

/// Rewrite the fixed dialect tokens in `sql` so it reads as `target` SQL.
///
/// This is plain substring replacement, not parsing: a token inside a string literal is
/// rewritten too. Returns a borrowed `Cow` when nothing changed.
///
/// ```rust
/// use sql_writeback::prelude::*;
///
/// let pg = translate_dialect("SELECT datetime('NOW', 'localtime')", Dialect::Networked);
/// assert_eq!(pg, "SELECT NOW()");
/// ```
#[must_use]
pub fn translate_dialect(sql: &str, target: Dialect) -> Cow<'_, str> {
    let mut out: Cow<'_, str> = Cow::Borrowed(sql);
    for (embedded, networked) in DIALECT_TOKENS {
        let (from, to) = match target {
            Dialect::Networked => (*embedded, *networked),
            Dialect::Embedded => (*networked, *embedded),
        };
        if out.contains(from) {
            out = Cow::Owned(out.replace(from, to));
        }
    }
    out
}
