// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Imperfection model — mutates a line of words into renderable segments
// with defect annotations (misspellings, strike-throughs, erasures).
//
// All randomness flows through the caller-supplied `Rng` handle: the same
// input text and random sequence always yield the same segments.

use rand::Rng;

/// How a word should be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Defect {
    /// Plain handwriting.
    Normal,
    /// The word is written misspelled, lightly underlined, with the correct
    /// spelling added above in a smaller hand.
    Misspelled { correction: String },
    /// The word is written, struck through with a wavy line, and corrected
    /// above.
    StruckThrough { correction: String },
    /// The word is written faintly (erased ghost) and rewritten over itself
    /// slightly offset. Carries no correction — the final text is the word.
    ErasureRedo,
}

/// A word-level unit of renderable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    pub defect: Defect,
}

impl TextSegment {
    fn normal(text: &str) -> Self {
        Self {
            text: text.into(),
            defect: Defect::Normal,
        }
    }
}

/// Keyboard adjacency used for the "nearby key" misspelling. Unmapped
/// characters are left unchanged.
const KEYBOARD_NEIGHBORS: &[(char, char)] = &[
    ('a', 's'),
    ('s', 'a'),
    ('d', 's'),
    ('e', 'r'),
    ('r', 't'),
    ('t', 'y'),
    ('i', 'o'),
    ('o', 'p'),
    ('n', 'm'),
    ('m', 'n'),
];

fn keyboard_neighbor(c: char) -> Option<char> {
    KEYBOARD_NEIGHBORS
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
}

/// Split one line of text into ordered segments, injecting defects.
///
/// Each word longer than two characters rolls against `probability`; on a
/// hit the defect class is drawn from a weighted distribution
/// (misspelled 0.4, struck-through 0.4, erasure 0.2). Words of length two
/// or less are never mutated. Whitespace is not materialised — the stroke
/// renderer inserts randomized inter-word gaps.
pub fn segment_line<R: Rng>(text: &str, probability: f64, rng: &mut R) -> Vec<TextSegment> {
    let mut segments = Vec::new();

    for word in text.split_whitespace() {
        let roll: f64 = rng.gen_range(0.0..1.0);

        if roll < probability && word.chars().count() > 2 {
            let class: f64 = rng.gen_range(0.0..1.0);
            if class < 0.4 {
                segments.push(TextSegment {
                    text: misspell(word, rng),
                    defect: Defect::Misspelled {
                        correction: word.into(),
                    },
                });
            } else if class < 0.8 {
                segments.push(TextSegment {
                    text: word.into(),
                    defect: Defect::StruckThrough {
                        correction: word.into(),
                    },
                });
            } else {
                segments.push(TextSegment {
                    text: word.into(),
                    defect: Defect::ErasureRedo,
                });
            }
        } else {
            segments.push(TextSegment::normal(word));
        }
    }

    segments
}

/// Generate a plausible misspelling of `word`.
///
/// Picks one of four mutations uniformly and applies it at a single random
/// position. Mutations whose length guard fails leave the word unchanged.
pub(crate) fn misspell<R: Rng>(word: &str, rng: &mut R) -> String {
    let chars: Vec<char> = word.chars().collect();
    let len = chars.len();
    if len < 3 {
        return word.into();
    }

    match rng.gen_range(0..4u32) {
        // Swap two adjacent characters.
        0 => {
            let pos = rng.gen_range(1..len - 1);
            let mut out = chars.clone();
            out.swap(pos, pos + 1);
            out.into_iter().collect()
        }
        // Double a character.
        1 => {
            let pos = rng.gen_range(0..len);
            let mut out = chars.clone();
            out.insert(pos, chars[pos]);
            out.into_iter().collect()
        }
        // Drop an interior character.
        2 if len >= 4 => {
            let pos = rng.gen_range(1..len - 1);
            let mut out = chars.clone();
            out.remove(pos);
            out.into_iter().collect()
        }
        // Substitute a neighbouring key, preserving case.
        3 => {
            let pos = rng.gen_range(0..len);
            let original = chars[pos];
            let lower = original.to_ascii_lowercase();
            let replacement = match keyboard_neighbor(lower) {
                Some(n) if original.is_ascii_uppercase() => n.to_ascii_uppercase(),
                Some(n) => n,
                None => original,
            };
            let mut out = chars.clone();
            out[pos] = replacement;
            out.into_iter().collect()
        }
        _ => word.into(),
    }
}
