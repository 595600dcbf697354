//! Filler Document Rendering
//!
//! Produces multi-page PDFs of random business-speak sentences. Every line
//! gets a random font, style and size, and is followed by a short run of
//! white 6 pt letters that is invisible on the page but present in the text
//! layer.

pub mod pdf;

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::metrics;
use pdf::{Font, PdfDocument, Rgb};

/// Vocabulary for generated sentences
pub const WORDS: [&str; 12] = [
    "strategy", "growth", "market", "value", "user", "product", "system", "data", "cloud", "AI",
    "project", "scale",
];

const SENTENCE_WORDS: std::ops::RangeInclusive<usize> = 10..=20;
const FONT_SIZES: std::ops::RangeInclusive<u8> = 10..=14;
const NOISE_LENGTH: usize = 10;
const NOISE_FONT_SIZE: f32 = 6.0;

/// Errors produced while rendering a document
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Layout parameters are unusable
    #[error("Invalid document layout: {0}")]
    InvalidLayout(String),

    /// Rendering failed
    #[error("Document rendering failed: {0}")]
    Failed(String),
}

/// Produces one complete document per call
///
/// Takes no parameters and has no relationship to the caller's identity or
/// quota.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self) -> Result<Vec<u8>, RenderError>;
}

/// Document layout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentConfig {
    /// Pages started explicitly (overflow may add more)
    pub pages: u32,

    /// Fewest sentences per page
    pub min_lines: u32,

    /// Most sentences per page
    pub max_lines: u32,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            pages: 10,
            min_lines: 20,
            max_lines: 25,
        }
    }
}

impl DocumentConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.pages == 0 {
            return Err(RenderError::InvalidLayout("pages must be > 0".to_string()));
        }
        if self.min_lines == 0 {
            return Err(RenderError::InvalidLayout("min_lines must be > 0".to_string()));
        }
        if self.min_lines > self.max_lines {
            return Err(RenderError::InvalidLayout(format!(
                "min_lines ({}) must be <= max_lines ({})",
                self.min_lines, self.max_lines
            )));
        }
        Ok(())
    }
}

/// Renderer for randomized filler documents
#[derive(Debug, Clone)]
pub struct FillerRenderer {
    config: DocumentConfig,
    seed: Option<u64>,
}

impl FillerRenderer {
    pub fn new(config: DocumentConfig) -> Result<Self, RenderError> {
        config.validate()?;
        Ok(Self { config, seed: None })
    }

    /// Render the same bytes on every call
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    fn build(&self, rng: &mut fastrand::Rng) -> PdfDocument {
        let mut doc = PdfDocument::new();

        for _ in 0..self.config.pages {
            doc.add_page();

            let lines = rng.u32(self.config.min_lines..=self.config.max_lines);
            for _ in 0..lines {
                let family = Font::FAMILIES[rng.usize(..Font::FAMILIES.len())];
                let style = Font::STYLES[rng.usize(..Font::STYLES.len())];
                let size = f32::from(rng.u8(FONT_SIZES));

                doc.set_font(Font::new(family, style), size);
                doc.paragraph(size * 1.5, &random_sentence(rng));

                doc.set_text_color(Rgb::WHITE);
                doc.set_font(Font::default(), NOISE_FONT_SIZE);
                doc.line(NOISE_FONT_SIZE * 1.2, &noise(rng));
                doc.set_text_color(Rgb::BLACK);
            }
        }

        doc
    }
}

impl DocumentRenderer for FillerRenderer {
    fn render(&self) -> Result<Vec<u8>, RenderError> {
        let started = Instant::now();

        let mut rng = match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let doc = self.build(&mut rng);
        let pages = doc.page_count();
        let bytes = doc.finish();

        let elapsed = started.elapsed();
        metrics::DOCUMENTS_RENDERED_TOTAL.inc();
        metrics::DOCUMENT_RENDER_SECONDS.observe(elapsed.as_secs_f64());
        tracing::debug!(
            pages,
            bytes = bytes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Rendered filler document"
        );

        Ok(bytes)
    }
}

/// 10-20 random words, sentence-cased, ending with a period
pub fn random_sentence(rng: &mut fastrand::Rng) -> String {
    let length = rng.usize(SENTENCE_WORDS);
    let words: Vec<&str> = (0..length)
        .map(|_| WORDS[rng.usize(..WORDS.len())])
        .collect();

    let lowered = words.join(" ").to_lowercase();
    let mut chars = lowered.chars();
    let mut sentence = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    sentence.push('.');
    sentence
}

/// Random ASCII letters for the invisible text layer
pub fn noise(rng: &mut fastrand::Rng) -> String {
    (0..NOISE_LENGTH).map(|_| rng.alphabetic()).collect()
}

/// Attachment name in the form `Dataset_NNNN.pdf`
pub fn download_filename() -> String {
    format!("Dataset_{}.pdf", fastrand::u16(1000..=9999))
}
