use std::collections::BTreeSet;

use nom::branch::alt;
use nom::character::complete::char as cchar;
use nom::character::complete::{one_of, satisfy};
use nom::combinator::{all_consuming, map, opt};
use nom::multi::{many0_count, many1_count, separated_list1};
use nom::sequence::{delimited, pair};
use nom::IResult;

use crate::TransformError;

/// End-of-expression marker appended during normalization. Must not occur
/// in source regexes.
pub const END_MARKER: char = '#';

/// The atom matching the empty string.
pub const EMPTY_SYMBOL: char = '_';

/// Structural characters; everything else is an alphabet symbol.
const OPERATORS: &str = "()|*+";

type NResult<'a, T> = IResult<&'a str, T>;

/*
 * Validation grammar. Accepts exactly the regexes with balanced
 * parentheses and legally placed operators:
 *
 * alternation   ::= concatenation ('|' concatenation)* ;
 * concatenation ::= repetition+ ;
 * repetition    ::= atom ('*' | '+')* ;
 * atom          ::= literal | '(' alternation? ')' ;
 * literal       ::= any char not in { ( ) | * + } ;
 *
 * The empty string and the empty group "()" are both valid; the
 * normalizer erases empty groups before parsing.
 */

fn literal(input: &str) -> NResult<char> {
    satisfy(|c| !OPERATORS.contains(c))(input)
}

fn atom(input: &str) -> NResult<()> {
    alt((
        map(literal, |_| ()),
        map(delimited(cchar('('), opt(alternation), cchar(')')), |_| ()),
    ))(input)
}

fn repetition(input: &str) -> NResult<()> {
    map(pair(atom, many0_count(one_of("*+"))), |_| ())(input)
}

fn concatenation(input: &str) -> NResult<()> {
    map(many1_count(repetition), |_| ())(input)
}

fn alternation(input: &str) -> NResult<()> {
    map(separated_list1(cchar('|'), concatenation), |_| ())(input)
}

/// Whether `regex` may enter the pipeline. Also used while parsing to
/// decide if enclosing parentheses are redundant.
pub fn is_valid(regex: &str) -> bool {
    all_consuming(opt(alternation))(regex).is_ok()
}

pub fn strip_whitespace(regex: &str) -> String {
    regex.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

fn erase_empty_groups(regex: &str) -> String {
    let mut erased = regex.to_string();
    loop {
        // A quantified empty group is still the empty group, an empty group
        // standing as a union operand is the empty-symbol atom, and anywhere
        // else dropping "()" leaves the language unchanged. Plain removal in
        // the first two positions would strand the quantifier or the bar on
        // a neighbouring subexpression.
        let next = erased
            .replace("()*", "()")
            .replace("()+", "()")
            .replace("|()", &format!("|{EMPTY_SYMBOL}"))
            .replace("()|", &format!("{EMPTY_SYMBOL}|"))
            .replace("()", "");
        if next == erased {
            return erased;
        }
        erased = next;
    }
}

fn collapse_quantifiers(regex: &str) -> String {
    let mut collapsed = regex.to_string();
    loop {
        // Mixed pairs collapse to '*' (one-or-more under zero-or-more
        // framing is zero-or-more); repeated identical quantifiers are
        // redundant.
        let next = collapsed
            .replace("+*", "*")
            .replace("*+", "*")
            .replace("**", "*")
            .replace("++", "+");
        if next == collapsed {
            return collapsed;
        }
        collapsed = next;
    }
}

/// Rewrites a validated regex into the augmented form `(regex)#` with
/// whitespace already stripped, redundant quantifiers collapsed and empty
/// groups erased. Rejects characters outside the ASCII input language and
/// any occurrence of the reserved end marker.
pub fn normalize(regex: &str) -> Result<String, TransformError> {
    if let Some(unsupported) = regex.chars().find(|&c| !c.is_ascii() || c == END_MARKER) {
        return Err(TransformError::UnsupportedSymbol(unsupported));
    }

    // Collapse first so a stacked quantifier on an empty group ("()**")
    // reaches the erasure as the single-quantifier form it folds away.
    let body = erase_empty_groups(&collapse_quantifiers(regex));
    if body.is_empty() {
        // The whole expression collapsed away; its language is {""}.
        return Ok(END_MARKER.to_string());
    }
    Ok(format!("({body}){END_MARKER}"))
}

/// Every non-operator character of the normalized regex. Includes the end
/// marker and, when present, the empty symbol.
pub fn extract_alphabet(normalized: &str) -> BTreeSet<char> {
    normalized.chars().filter(|c| !OPERATORS.contains(*c)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxNode {
    Leaf { symbol: char },
    Concat(Box<SyntaxNode>, Box<SyntaxNode>),
    Union(Box<SyntaxNode>, Box<SyntaxNode>),
    Star(Box<SyntaxNode>),
    Plus(Box<SyntaxNode>),
}

/// First occurrence of each operator category at the top level of a
/// subexpression, found by one scan that steps over parenthesized groups.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SplitPoints {
    union: Option<usize>,
    concat: Option<usize>,
    plus: Option<usize>,
    star: Option<usize>,
}

fn scan_operators(regex: &str, alphabet: &BTreeSet<char>) -> SplitPoints {
    let bytes = regex.as_bytes();
    let mut points = SplitPoints::default();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'(' {
            let mut depth = 1;
            index += 1;
            while depth != 0 && index < bytes.len() {
                match bytes[index] {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                index += 1;
            }
        } else {
            index += 1;
        }
        if index == bytes.len() {
            break;
        }

        let next = bytes[index] as char;
        if next == '(' || alphabet.contains(&next) {
            // An atom right after a complete unit is a concatenation
            // boundary; leave it for the next round of the scan.
            if points.concat.is_none() {
                points.concat = Some(index);
            }
            continue;
        }
        match next {
            '*' => {
                if points.star.is_none() {
                    points.star = Some(index);
                }
            }
            '+' => {
                if points.plus.is_none() {
                    points.plus = Some(index);
                }
            }
            '|' => {
                if points.union.is_none() {
                    points.union = Some(index);
                }
                index += 1;
            }
            _ => {}
        }
    }

    points
}

/// Strips enclosing parentheses while the interior is still a complete,
/// valid regex on its own, so `((a|b))` parses the same as `a|b` but
/// `(a)(b)` keeps its groups.
fn trim_parentheses(regex: &str) -> &str {
    let mut trimmed = regex;
    while trimmed.len() >= 2
        && trimmed.starts_with('(')
        && trimmed.ends_with(')')
        && is_valid(&trimmed[1..trimmed.len() - 1])
    {
        trimmed = &trimmed[1..trimmed.len() - 1];
    }
    trimmed
}

/// Recursively parses a normalized regex into its syntax tree. Redundant
/// enclosing parentheses are stripped on entry, so each recursion step sees
/// the smallest equivalent subexpression.
///
/// The split point is the first occurrence of the loosest-binding operator
/// present: union, else concatenation, else plus, else star. `+` becomes a
/// `Plus` node over the operand subtree; the one-or-more semantics are
/// handled by the annotation pass, not by duplicating text.
pub fn parse_regex(regex: &str, alphabet: &BTreeSet<char>) -> Result<SyntaxNode, TransformError> {
    let regex = trim_parentheses(regex);
    log::debug!("parsing subexpression {regex:?}");

    let mut symbols = regex.chars();
    match (symbols.next(), symbols.next()) {
        (Some(symbol), None) => {
            return if alphabet.contains(&symbol) {
                Ok(SyntaxNode::Leaf { symbol })
            } else {
                Err(TransformError::Unparseable(regex.to_string()))
            };
        }
        (None, _) => return Err(TransformError::Unparseable(regex.to_string())),
        _ => {}
    }

    let points = scan_operators(regex, alphabet);
    if let Some(at) = points.union {
        let left = parse_regex(&regex[..at], alphabet)?;
        let right = parse_regex(&regex[at + 1..], alphabet)?;
        Ok(SyntaxNode::Union(Box::new(left), Box::new(right)))
    } else if let Some(at) = points.concat {
        let left = parse_regex(&regex[..at], alphabet)?;
        let right = parse_regex(&regex[at..], alphabet)?;
        Ok(SyntaxNode::Concat(Box::new(left), Box::new(right)))
    } else if let Some(at) = points.plus {
        let operand = parse_regex(&regex[..at], alphabet)?;
        Ok(SyntaxNode::Plus(Box::new(operand)))
    } else if let Some(at) = points.star {
        let operand = parse_regex(&regex[..at], alphabet)?;
        Ok(SyntaxNode::Star(Box::new(operand)))
    } else {
        Err(TransformError::Unparseable(regex.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphabet(symbols: &str) -> BTreeSet<char> {
        symbols.chars().collect()
    }

    fn leaf(symbol: char) -> SyntaxNode {
        SyntaxNode::Leaf { symbol }
    }

    fn concat(left: SyntaxNode, right: SyntaxNode) -> SyntaxNode {
        SyntaxNode::Concat(Box::new(left), Box::new(right))
    }

    fn union(left: SyntaxNode, right: SyntaxNode) -> SyntaxNode {
        SyntaxNode::Union(Box::new(left), Box::new(right))
    }

    fn star(operand: SyntaxNode) -> SyntaxNode {
        SyntaxNode::Star(Box::new(operand))
    }

    fn plus(operand: SyntaxNode) -> SyntaxNode {
        SyntaxNode::Plus(Box::new(operand))
    }

    #[test]
    fn accepts_well_formed_regexes() {
        for regex in [
            "", "a", "ab", "a|b", "(a|b)*abb", "a**", "a*+", "a++", "()", "(a)(b)", "a(b|c)+",
            "((a))", "_", "a|_", "()|a", "a|()",
        ] {
            assert!(is_valid(regex), "expected {regex:?} to be valid");
        }
    }

    #[test]
    fn rejects_unbalanced_parentheses() {
        for regex in ["(a|b", "a)b(", "(()", "ab)", "("] {
            assert!(!is_valid(regex), "expected {regex:?} to be invalid");
        }
    }

    #[test]
    fn rejects_misplaced_operators() {
        for regex in [
            "*a", "+a", "|a", "a|", "a||b", "(|a)", "(a|)", "(*a)", "(+a)", "a(*b)", "a|*b", "|",
        ] {
            assert!(!is_valid(regex), "expected {regex:?} to be invalid");
        }
    }

    #[test]
    fn strips_whitespace() {
        assert_eq!(strip_whitespace(" a b\t| c "), "ab|c");
    }

    #[test]
    fn collapses_adjacent_quantifiers() {
        assert_eq!(normalize("a+*"), Ok("(a*)#".to_string()));
        assert_eq!(normalize("a*+"), Ok("(a*)#".to_string()));
        assert_eq!(normalize("a**"), Ok("(a*)#".to_string()));
        // One-or-more repeated is still one-or-more, never zero-or-more.
        assert_eq!(normalize("a++"), Ok("(a+)#".to_string()));
        assert_eq!(normalize("a*+*+"), Ok("(a*)#".to_string()));
    }

    #[test]
    fn augments_with_end_marker() {
        assert_eq!(normalize("ab|c"), Ok("(ab|c)#".to_string()));
    }

    #[test]
    fn erases_empty_groups() {
        assert_eq!(normalize("a()b"), Ok("(ab)#".to_string()));
        assert_eq!(normalize("(())"), Ok("#".to_string()));
        assert_eq!(normalize(""), Ok("#".to_string()));
        // A quantifier on an empty group vanishes with the group instead of
        // latching onto the neighbouring subexpression.
        assert_eq!(normalize("a+()*"), Ok("(a+)#".to_string()));
        assert_eq!(normalize("a()+b"), Ok("(ab)#".to_string()));
        assert_eq!(normalize("()*a"), Ok("(a)#".to_string()));
        assert_eq!(normalize("(())+"), Ok("#".to_string()));
        assert_eq!(normalize("()**"), Ok("#".to_string()));
    }

    #[test]
    fn empty_group_as_union_operand_becomes_empty_symbol() {
        assert_eq!(normalize("a|()"), Ok("(a|_)#".to_string()));
        assert_eq!(normalize("()|a"), Ok("(_|a)#".to_string()));
        assert_eq!(normalize("a|()+"), Ok("(a|_)#".to_string()));
    }

    #[test]
    fn rejects_unsupported_symbols() {
        assert_eq!(normalize("a#b"), Err(TransformError::UnsupportedSymbol('#')));
        assert_eq!(normalize("aéb"), Err(TransformError::UnsupportedSymbol('é')));
    }

    #[test]
    fn extracts_alphabet_from_normalized_regex() {
        assert_eq!(extract_alphabet("(ab|c)#"), alphabet("abc#"));
        assert_eq!(extract_alphabet("(a|_)#"), alphabet("a_#"));
    }

    #[test]
    fn parses_single_symbol() {
        assert_eq!(parse_regex("a", &alphabet("a")), Ok(leaf('a')));
    }

    #[test]
    fn union_splits_before_concatenation() {
        assert_eq!(
            parse_regex("ab|c", &alphabet("abc")),
            Ok(union(concat(leaf('a'), leaf('b')), leaf('c')))
        );
    }

    #[test]
    fn star_binds_tighter_than_concatenation() {
        assert_eq!(
            parse_regex("ab*", &alphabet("ab")),
            Ok(concat(leaf('a'), star(leaf('b'))))
        );
    }

    #[test]
    fn star_scopes_over_parenthesized_group() {
        assert_eq!(
            parse_regex("(ab)*", &alphabet("ab")),
            Ok(star(concat(leaf('a'), leaf('b'))))
        );
    }

    #[test]
    fn plus_keeps_operand_subtree() {
        assert_eq!(
            parse_regex("(ab)+", &alphabet("ab")),
            Ok(plus(concat(leaf('a'), leaf('b'))))
        );
    }

    #[test]
    fn plus_composes_with_concatenation() {
        assert_eq!(
            parse_regex("(ab)+c", &alphabet("abc")),
            Ok(concat(plus(concat(leaf('a'), leaf('b'))), leaf('c')))
        );
    }

    #[test]
    fn strips_redundant_parentheses() {
        assert_eq!(parse_regex("((a))", &alphabet("a")), Ok(leaf('a')));
        assert_eq!(
            parse_regex("(a)(b)", &alphabet("ab")),
            Ok(concat(leaf('a'), leaf('b')))
        );
        assert_eq!(
            parse_regex("(((a)))b", &alphabet("ab")),
            Ok(concat(leaf('a'), leaf('b')))
        );
    }

    #[test]
    fn union_is_right_nested() {
        assert_eq!(
            parse_regex("a|b|c", &alphabet("abc")),
            Ok(union(leaf('a'), union(leaf('b'), leaf('c'))))
        );
    }

    #[test]
    fn empty_subexpression_is_unparseable() {
        assert_eq!(
            parse_regex("", &alphabet("a")),
            Err(TransformError::Unparseable(String::new()))
        );
    }
}
