use std::collections::HashMap;

/// Legacy region code → current code, as published by boundary revisions.
///
/// When a code was revised several times, the revision with the latest year
/// wins; ties on year go to the lexicographically greatest new code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeLookup {
    map: HashMap<String, String>,
}

impl CodeLookup {
    /// Build from `(old, new, year)` revision rows.
    pub fn from_revisions<I>(revisions: I) -> Self
    where
        I: IntoIterator<Item = (String, String, i32)>,
    {
        let mut latest: HashMap<String, (i32, String)> = HashMap::new();
        for (old, new, year) in revisions {
            let newer = match latest.get(&old) {
                Some((y, n)) => (year, new.as_str()) > (*y, n.as_str()),
                None => true,
            };
            if newer {
                latest.insert(old, (year, new));
            }
        }
        Self {
            map: latest.into_iter().map(|(old, (_, new))| (old, new)).collect(),
        }
    }

    /// Current code for `code`; unknown codes pass through.
    pub fn apply<'a>(&'a self, code: &'a str) -> &'a str {
        self.map.get(code).map(String::as_str).unwrap_or(code)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(old: &str, new: &str, year: i32) -> (String, String, i32) {
        (old.into(), new.into(), year)
    }

    #[test]
    fn latest_year_wins() {
        let lookup = CodeLookup::from_revisions(vec![
            rev("GR111", "EL511", 2013),
            rev("GR111", "EL515", 2016),
            rev("GR112", "EL512", 2013),
        ]);
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.apply("GR111"), "EL515");
        assert_eq!(lookup.apply("GR112"), "EL512");
    }

    #[test]
    fn order_independent() {
        let a = CodeLookup::from_revisions(vec![rev("X", "B", 2016), rev("X", "A", 2013)]);
        let b = CodeLookup::from_revisions(vec![rev("X", "A", 2013), rev("X", "B", 2016)]);
        assert_eq!(a, b);
        assert_eq!(a.apply("X"), "B");
    }

    #[test]
    fn unknown_codes_pass_through() {
        let lookup = CodeLookup::from_revisions(vec![rev("GR111", "EL511", 2013)]);
        assert_eq!(lookup.apply("EL301"), "EL301");
    }
}
