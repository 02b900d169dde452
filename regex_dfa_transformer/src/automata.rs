use std::collections::{BTreeSet, HashMap, VecDeque};

use derive_getters::Getters;
use itertools::Itertools;

use crate::regex::{SyntaxNode, EMPTY_SYMBOL, END_MARKER};

/// One leaf of the syntax tree: its symbol and the positions that may
/// follow it in a match. Entry index equals the leaf position.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct FollowEntry {
    symbol: char,
    follows: Vec<usize>,
}

/// The global followpos table, filled during annotation. Entries are only
/// appended; follow sets only grow and stay sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowTable {
    entries: Vec<FollowEntry>,
}

impl FollowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leaves annotated so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, position: usize) -> &FollowEntry {
        &self.entries[position]
    }

    fn push_leaf(&mut self, symbol: char) -> usize {
        self.entries.push(FollowEntry {
            symbol,
            follows: Vec::new(),
        });
        self.entries.len() - 1
    }

    fn add_follow(&mut self, position: usize, follower: usize) {
        let follows = &mut self.entries[position].follows;
        if let Err(slot) = follows.binary_search(&follower) {
            follows.insert(slot, follower);
        }
    }
}

/// Per-node result of the annotation pass. Position vectors are sorted and
/// deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub nullable: bool,
    pub first_positions: Vec<usize>,
    pub last_positions: Vec<usize>,
}

fn union_of(a: &[usize], b: &[usize]) -> Vec<usize> {
    a.iter().chain(b.iter()).copied().sorted().dedup().collect()
}

/// Post-order annotation: assigns leaf positions left to right starting at
/// `next_position`, computes nullable/firstpos/lastpos and records every
/// followpos contribution in `follow`. Returns the node's annotation and
/// the next free position.
pub fn annotate(
    node: &SyntaxNode,
    next_position: usize,
    follow: &mut FollowTable,
) -> (Annotation, usize) {
    match node {
        SyntaxNode::Leaf { symbol } => {
            let position = follow.push_leaf(*symbol);
            debug_assert_eq!(position, next_position);
            (
                Annotation {
                    nullable: *symbol == EMPTY_SYMBOL,
                    first_positions: vec![position],
                    last_positions: vec![position],
                },
                position + 1,
            )
        }
        SyntaxNode::Concat(left_node, right_node) => {
            let (left, next_position) = annotate(left_node, next_position, follow);
            let (right, next_position) = annotate(right_node, next_position, follow);
            for &i in &left.last_positions {
                for &j in &right.first_positions {
                    follow.add_follow(i, j);
                }
            }
            let first_positions = if left.nullable {
                union_of(&left.first_positions, &right.first_positions)
            } else {
                left.first_positions
            };
            let last_positions = if right.nullable {
                union_of(&left.last_positions, &right.last_positions)
            } else {
                right.last_positions
            };
            (
                Annotation {
                    nullable: left.nullable && right.nullable,
                    first_positions,
                    last_positions,
                },
                next_position,
            )
        }
        SyntaxNode::Union(left_node, right_node) => {
            let (left, next_position) = annotate(left_node, next_position, follow);
            let (right, next_position) = annotate(right_node, next_position, follow);
            (
                Annotation {
                    nullable: left.nullable || right.nullable,
                    first_positions: union_of(&left.first_positions, &right.first_positions),
                    last_positions: union_of(&left.last_positions, &right.last_positions),
                },
                next_position,
            )
        }
        SyntaxNode::Star(operand) | SyntaxNode::Plus(operand) => {
            let (child, next_position) = annotate(operand, next_position, follow);
            for &i in &child.last_positions {
                for &j in &child.first_positions {
                    follow.add_follow(i, j);
                }
            }
            (
                Annotation {
                    nullable: matches!(node, SyntaxNode::Star(_)) || child.nullable,
                    first_positions: child.first_positions,
                    last_positions: child.last_positions,
                },
                next_position,
            )
        }
    }
}

/// The constructed DFA. States are identified by their cores (sets of leaf
/// positions) in discovery order; the alphabet excludes the end marker and
/// the empty symbol.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Automaton {
    states: Vec<Vec<usize>>,
    alphabet: Vec<char>,
    transitions: Vec<HashMap<char, usize>>,
    start_state: usize,
    final_states: Vec<usize>,
}

/// Worklist subset construction over the followpos table, seeded with the
/// root's firstpos set. States are processed FIFO and symbols in sorted
/// alphabet order, so discovery order (and hence state IDs) is reproducible.
pub fn to_dfa(
    root_first_positions: &[usize],
    follow: &FollowTable,
    alphabet: &BTreeSet<char>,
) -> Automaton {
    let working_alphabet: Vec<char> = alphabet
        .iter()
        .copied()
        .filter(|&symbol| symbol != END_MARKER && symbol != EMPTY_SYMBOL)
        .collect();

    let is_final = |core: &[usize]| {
        core.iter()
            .any(|&position| *follow.entry(position).symbol() == END_MARKER)
    };

    let seed = root_first_positions.to_vec();
    let mut states = vec![seed.clone()];
    let mut transitions = vec![HashMap::new()];
    let mut state_ids: HashMap<Vec<usize>, usize> = HashMap::from([(seed.clone(), 0)]);
    let mut final_states = Vec::new();
    if is_final(&seed) {
        final_states.push(0);
    }

    let mut worklist = VecDeque::from([0usize]);
    while let Some(current) = worklist.pop_front() {
        let core = states[current].clone();
        for &symbol in &working_alphabet {
            let next_core: Vec<usize> = core
                .iter()
                .filter(|&&position| *follow.entry(position).symbol() == symbol)
                .flat_map(|&position| follow.entry(position).follows().iter().copied())
                .sorted()
                .dedup()
                .collect();
            if next_core.is_empty() {
                // No position carrying this symbol leads anywhere: reject.
                continue;
            }
            let next = match state_ids.get(&next_core) {
                Some(&id) => id,
                None => {
                    let id = states.len();
                    log::debug!("state q{id} discovered with core {next_core:?}");
                    if is_final(&next_core) {
                        final_states.push(id);
                    }
                    state_ids.insert(next_core.clone(), id);
                    states.push(next_core);
                    transitions.push(HashMap::new());
                    worklist.push_back(id);
                    id
                }
            };
            transitions[current].insert(symbol, next);
        }
    }

    Automaton {
        states,
        alphabet: working_alphabet,
        transitions,
        start_state: 0,
        final_states,
    }
}

impl Automaton {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn transition(&self, state: usize, symbol: char) -> Option<usize> {
        self.transitions.get(state)?.get(&symbol).copied()
    }

    pub fn is_final(&self, state: usize) -> bool {
        self.final_states.contains(&state)
    }

    /// Simulates the DFA over `input`. Any undefined transition rejects.
    pub fn accepts(&self, input: &str) -> bool {
        let mut state = self.start_state;
        for symbol in input.chars() {
            match self.transition(state, symbol) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_final(state)
    }

    /// Transition matrix as semicolon-separated text: a final-state marker
    /// row, a state name row, then one row per alphabet symbol with the
    /// destination state per column (blank where undefined).
    pub fn to_table(&self) -> String {
        let mut table = String::new();

        table.push(';');
        for state in 0..self.states.len() {
            if self.is_final(state) {
                table.push('F');
            }
            table.push(';');
        }
        table.push('\n');

        table.push(';');
        for state in 0..self.states.len() {
            table.push_str(&format!("q{state};"));
        }
        table.push('\n');

        for &symbol in &self.alphabet {
            table.push_str(&format!("{symbol};"));
            for state in 0..self.states.len() {
                if let Some(next) = self.transition(state, symbol) {
                    table.push_str(&format!("q{next}"));
                }
                table.push(';');
            }
            table.push('\n');
        }

        table
    }
}
