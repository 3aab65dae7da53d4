use std::fmt;

/// Splits `name`, `name@range` or `@scope/name@range` into name and range.
///
/// The leading `@` of a scoped name is never a separator; the last `@` after
/// it is. An empty range (`pkg@`) counts as no range.
pub fn split_specifier(spec: &str) -> (&str, Option<&str>) {
    match spec.rfind('@') {
        Some(index) if index > 0 => {
            let (name, range) = (&spec[..index], &spec[index + 1..]);
            if range.is_empty() {
                (name, None)
            } else {
                (name, Some(range))
            }
        }
        _ => (spec, None),
    }
}

/// A requested package: the raw input plus its split name and range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub raw: String,
    pub name: String,
    pub range: Option<String>,
}

impl PackageSpec {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (name, range) = split_specifier(raw);
        Self {
            raw: raw.to_string(),
            name: name.to_string(),
            range: range.map(ToOwned::to_owned),
        }
    }

    pub fn with_range(name: &str, range: Option<&str>) -> Self {
        let raw = match range {
            Some(range) => format!("{name}@{range}"),
            None => name.to_string(),
        };
        Self {
            raw,
            name: name.to_string(),
            range: range.map(ToOwned::to_owned),
        }
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
