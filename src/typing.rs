//! Typed-out presentation of a finished response.
//!
//! A [`Typewriter`] owns the full fragment and reveals it one piece per tick.
//! The caller drives the ticks (an iced timer subscription); the typewriter
//! only decides what becomes visible next.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{StrategyChoice, TypingConfig};
use crate::markup::{Block, Fragment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// One character per tick, code included.
    Character,
    /// One whitespace-separated word per tick; code blocks appear whole.
    Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingStrategy {
    pub cadence: Cadence,
    pub interval: Duration,
}

/// Timer periods must be non-zero.
const MIN_INTERVAL_MS: u64 = 1;

fn tick_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.max(MIN_INTERVAL_MS))
}

impl TypingStrategy {
    /// Picks a strategy from the shape of the response. Code is typed out
    /// character by character at the slower code pace so indentation survives.
    pub fn select(fragment: &Fragment, config: &TypingConfig) -> Self {
        let has_code = fragment.has_code();
        let character = TypingStrategy {
            cadence: Cadence::Character,
            interval: tick_interval(if has_code {
                config.code_interval_ms
            } else {
                config.char_interval_ms
            }),
        };
        let word = TypingStrategy {
            cadence: Cadence::Word,
            interval: tick_interval(config.word_interval_ms),
        };

        match config.strategy {
            StrategyChoice::Character => character,
            StrategyChoice::Word => word,
            StrategyChoice::Auto if has_code => character,
            StrategyChoice::Auto => word,
        }
    }
}

/// What one tick reveals. A word piece carries the whitespace in front of it,
/// each run tagged with the emphasis of the span it came from, so the pieces
/// of a block add back up to exactly that block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Piece {
    block: usize,
    parts: Vec<(String, bool)>,
}

impl Piece {
    fn single(block: usize, text: String, strong: bool) -> Self {
        Piece {
            block,
            parts: vec![(text, strong)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// One more piece is visible.
    Revealed,
    /// Everything is visible; no further ticks are needed.
    Finished,
    /// The turn was abandoned; nothing was touched.
    Cancelled,
}

#[derive(Debug)]
pub struct Typewriter {
    source: Fragment,
    pieces: Vec<Piece>,
    cursor: usize,
    revealed: Fragment,
    current_block: Option<usize>,
    strategy: TypingStrategy,
    token: CancellationToken,
}

impl Typewriter {
    pub fn start(source: Fragment, strategy: TypingStrategy) -> Self {
        let pieces = match strategy.cadence {
            Cadence::Character => character_pieces(&source),
            Cadence::Word => word_pieces(&source),
        };
        Typewriter {
            source,
            pieces,
            cursor: 0,
            revealed: Fragment::default(),
            current_block: None,
            strategy,
            token: CancellationToken::new(),
        }
    }

    pub fn strategy(&self) -> TypingStrategy {
        self.strategy
    }

    pub fn interval(&self) -> Duration {
        self.strategy.interval
    }

    /// A finished typewriter needs no ticks at all. True from the start for
    /// an empty response.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.pieces.len()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn revealed(&self) -> &Fragment {
        &self.revealed
    }

    pub fn remaining(&self) -> usize {
        self.pieces.len() - self.cursor
    }

    pub fn tick(&mut self) -> Tick {
        if self.token.is_cancelled() {
            return Tick::Cancelled;
        }

        let Some(piece) = self.pieces.get(self.cursor) else {
            return Tick::Finished;
        };

        if self.current_block != Some(piece.block) {
            if let Some(block) = self.source.blocks.get(piece.block) {
                self.revealed.blocks.push(block.empty_like());
            }
            self.current_block = Some(piece.block);
        }
        if let Some(block) = self.revealed.blocks.last_mut() {
            for (text, strong) in &piece.parts {
                block.push(text, *strong);
            }
        }
        self.cursor += 1;

        if self.is_finished() {
            Tick::Finished
        } else {
            Tick::Revealed
        }
    }

    /// The complete fragment, regardless of how much was revealed.
    pub fn into_source(self) -> Fragment {
        self.source
    }
}

fn character_pieces(fragment: &Fragment) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for (index, block) in fragment.blocks.iter().enumerate() {
        match block {
            Block::Text(spans) => {
                for span in spans {
                    for ch in span.text.chars() {
                        pieces.push(Piece::single(index, ch.to_string(), span.strong));
                    }
                }
            }
            Block::Code { code, .. } => {
                for ch in code.chars() {
                    pieces.push(Piece::single(index, ch.to_string(), false));
                }
            }
        }
    }
    pieces
}

/// One piece per word, code blocks whole. Whitespace is carried as found;
/// `markup::parse` has already collapsed it.
fn word_pieces(fragment: &Fragment) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for (index, block) in fragment.blocks.iter().enumerate() {
        match block {
            Block::Text(spans) => {
                let first = pieces.len();
                let mut current: Vec<(String, bool)> = Vec::new();
                let mut word = String::new();
                let mut in_word = false;
                for span in spans {
                    for ch in span.text.chars() {
                        if ch.is_whitespace() {
                            if in_word {
                                if !word.is_empty() {
                                    current.push((std::mem::take(&mut word), span.strong));
                                }
                                pieces.push(Piece {
                                    block: index,
                                    parts: std::mem::take(&mut current),
                                });
                                in_word = false;
                            }
                            push_part(&mut current, ch, span.strong);
                        } else {
                            word.push(ch);
                            in_word = true;
                        }
                    }
                    // A word may continue into the next span ("x**y**").
                    if !word.is_empty() {
                        current.push((std::mem::take(&mut word), span.strong));
                    }
                }

                if in_word || pieces.len() == first {
                    if !current.is_empty() {
                        pieces.push(Piece {
                            block: index,
                            parts: current,
                        });
                    }
                } else if let Some(last) = pieces.last_mut() {
                    last.parts.extend(current);
                }
            }
            Block::Code { code, .. } => {
                if !code.is_empty() {
                    pieces.push(Piece::single(index, code.clone(), false));
                }
            }
        }
    }
    pieces
}

fn push_part(parts: &mut Vec<(String, bool)>, ch: char, strong: bool) {
    match parts.last_mut() {
        Some((text, last_strong)) if *last_strong == strong => text.push(ch),
        _ => parts.push((ch.to_string(), strong)),
    }
}
