use std::collections::BTreeSet;

use thiserror::Error;

pub mod automata;
pub mod regex;

pub use crate::automata::{annotate, to_dfa, Annotation, Automaton, FollowEntry, FollowTable};
pub use crate::regex::{
    extract_alphabet, is_valid, normalize, parse_regex, strip_whitespace, SyntaxNode, EMPTY_SYMBOL,
    END_MARKER,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Unbalanced parentheses or an illegally placed operator. Nothing is
    /// built from such input.
    #[error("malformed regex: unbalanced parentheses or misplaced operator")]
    MalformedRegex,
    /// A character outside the ASCII input language, or the reserved end
    /// marker appearing in source input.
    #[error("unsupported symbol {0:?} in regex")]
    UnsupportedSymbol(char),
    /// A subexpression the splitter could not decompose. Unreachable for
    /// input that passed validation.
    #[error("no parse for subexpression {0:?}")]
    Unparseable(String),
}

/// Validates and normalizes `regex`, then parses it into a syntax tree.
/// Returns the tree together with the working alphabet extracted from the
/// normalized form (end marker included).
pub fn to_syntax_tree(regex: &str) -> Result<(SyntaxNode, BTreeSet<char>), TransformError> {
    let stripped = strip_whitespace(regex);
    if !is_valid(&stripped) {
        return Err(TransformError::MalformedRegex);
    }
    let normalized = normalize(&stripped)?;
    log::debug!("normalized {regex:?} to {normalized:?}");
    let alphabet = extract_alphabet(&normalized);
    let tree = parse_regex(&normalized, &alphabet)?;
    Ok((tree, alphabet))
}

/// Full pipeline: regex string to DFA via the direct (followpos)
/// construction, with no intermediate NFA.
pub fn to_automaton(regex: &str) -> Result<Automaton, TransformError> {
    let (tree, alphabet) = to_syntax_tree(regex)?;
    let mut follow = FollowTable::new();
    let (root, _) = annotate(&tree, 0, &mut follow);
    Ok(to_dfa(&root.first_positions, &follow, &alphabet))
}
