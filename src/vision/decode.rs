//! CTC decoding for the recognition model
//!
//! Class 0 is the CTC blank, classes 1..=N are dictionary characters and the
//! final class is a space.

use anyhow::{Context, Result};
use ndarray::ArrayView2;
use std::path::Path;

/// Greedy CTC decoder over a character dictionary
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    /// Index 0 is the blank placeholder
    characters: Vec<String>,
}

impl CtcDecoder {
    /// Build from dictionary text, one character (or symbol) per line
    pub fn from_dictionary(content: &str) -> Self {
        let mut characters = vec![String::new()];
        characters.extend(
            content
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
        characters.push(" ".to_string());
        Self { characters }
    }

    /// Load a dictionary file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dictionary {}", path.display()))?;
        let decoder = Self::from_dictionary(&content);
        if decoder.num_classes() <= 2 {
            anyhow::bail!("Dictionary {} is empty", path.display());
        }
        Ok(decoder)
    }

    /// Number of output classes the recognition model is expected to produce
    pub fn num_classes(&self) -> usize {
        self.characters.len()
    }

    /// Decode one `[T, C]` probability sequence into text and mean confidence.
    ///
    /// Repeated classes collapse, blanks are removed, and classes outside the
    /// dictionary are skipped. An empty result has confidence 0.
    pub fn decode(&self, pred: ArrayView2<'_, f32>) -> (String, f32) {
        let mut text = String::new();
        let mut confidence_sum = 0.0f32;
        let mut kept = 0usize;
        let mut previous: Option<usize> = None;

        for step in pred.rows() {
            let Some((class, &prob)) = step
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
            else {
                continue;
            };

            let repeated = previous == Some(class);
            previous = Some(class);
            if class == 0 || repeated {
                continue;
            }

            if let Some(symbol) = self.characters.get(class) {
                text.push_str(symbol);
                confidence_sum += prob;
                kept += 1;
            }
        }

        let confidence = if kept == 0 {
            0.0
        } else {
            confidence_sum / kept as f32
        };

        (text, confidence)
    }
}
