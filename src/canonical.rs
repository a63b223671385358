//! Program-local renaming of free symbols.
//!
//! After conversion, a program's free symbols keep the identifiers they had
//! in source, so two programs that differ only in which global they read have
//! different terms. Canonicalization renames free symbols to `v0`, `v1`, ...
//! in order of first appearance, so that only the shape of a program is
//! compared. The renaming is recorded so that source can be reconstructed.

use egg::Symbol;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    convert::FreeOrigin,
    term::{ParseTermError, Term},
};

/// What a canonical free symbol stood for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// The identifier as written in source.
    pub identifier: String,
    /// The source text of the expression the identifier first appeared in.
    pub expression: String,
}

/// A map from canonical names to their origins, in canonical order.
pub type FreeSymbolMap = IndexMap<String, Origin>;

/// A canonicalized term and the renaming that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Canonical {
    /// The term with free symbols renamed.
    pub term: Term,
    /// The origin of every renamed symbol.
    pub map: FreeSymbolMap,
}

/// The canonical name of the `k`th distinct free symbol.
#[must_use]
pub fn canonical_name(k: usize) -> String {
    format!("v{k}")
}

/// Returns `true` if `name` is a positional label, a single uppercase letter
/// that names a position rather than a value and is never renamed.
#[must_use]
pub fn is_positional_label(name: &str) -> bool {
    let mut chars = name.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}

/// Rename the free symbols of `term`.
///
/// Symbols are numbered by their first appearance in a pre-order walk. `free`
/// supplies the source expression each symbol came from; symbols missing from
/// it are recorded with their identifier as the expression.
#[must_use]
pub fn canonicalize(term: &Term, free: &IndexMap<Symbol, FreeOrigin>) -> Canonical {
    let mut renaming: IndexMap<Symbol, Symbol> = IndexMap::new();
    let mut map = FreeSymbolMap::new();
    for symbol in term.free_symbols() {
        if is_positional_label(symbol.as_str()) {
            continue;
        }
        let name = canonical_name(renaming.len());
        let expression = free
            .get(&symbol)
            .map_or_else(|| symbol.to_string(), |origin| origin.expression.clone());
        map.insert(
            name.clone(),
            Origin {
                identifier: symbol.to_string(),
                expression,
            },
        );
        renaming.insert(symbol, Symbol::from(name));
    }

    let term = term.transform(|t, _| match t {
        Term::Free(symbol) => renaming.get(symbol).map(|&s| Term::Free(s)),
        _ => None,
    });
    Canonical { term, map }
}

/// Canonicalize a term given in its text form, returning the canonical text.
///
/// # Errors
///
/// Returns an error if `text` is not a well-formed term.
pub fn canonicalize_text(text: &str) -> Result<(String, FreeSymbolMap), ParseTermError> {
    let term: Term = text.parse()?;
    let Canonical { term, map } = canonicalize(&term, &IndexMap::new());
    Ok((term.to_string(), map))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(s: &str) -> String {
        canonicalize_text(s).unwrap().0
    }

    #[test]
    fn renames_in_order_of_first_appearance() {
        let (text, map) = canonicalize_text("(lam (add (mul ROW $0) (sub COL ROW)))").unwrap();
        assert_eq!(text, "(lam (add (mul v0 $0) (sub v1 v0)))");
        assert_eq!(map.keys().collect::<Vec<_>>(), ["v0", "v1"]);
        assert_eq!(map["v1"].identifier, "COL");
    }

    #[test]
    fn only_whole_symbols_are_renamed() {
        assert_eq!(canonical("(add ROW ROWS)"), "(add v0 v1)");
        assert_eq!(canonical("(add \"ROW\" ROW)"), "(add \"ROW\" v0)");
    }

    #[test]
    fn primitives_and_labels_are_kept() {
        assert_eq!(canonical("(get A (len board))"), "(get A (len v0))");
        assert!(is_positional_label("B"));
        assert!(!is_positional_label("BB"));
        assert!(!is_positional_label("b"));
    }

    #[test]
    fn canonical_terms_are_fixed_points() {
        let once = canonical("(lam (mul (add x y) (add y x)))");
        assert_eq!(once, "(lam (mul (add v0 v1) (add v1 v0)))");
        assert_eq!(canonical(&once), once);
    }

    #[test]
    fn origins_come_from_conversion() {
        let term: Term = "(lam (add math.pi $0))".parse().unwrap();
        let mut free = IndexMap::new();
        free.insert(
            Symbol::from("math.pi"),
            FreeOrigin {
                expression: "math.pi * 2".to_owned(),
            },
        );
        let Canonical { term, map } = canonicalize(&term, &free);
        assert_eq!(term.to_string(), "(lam (add v0 $0))");
        assert_eq!(
            map["v0"],
            Origin {
                identifier: "math.pi".to_owned(),
                expression: "math.pi * 2".to_owned()
            }
        );
    }
}
