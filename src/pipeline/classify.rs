//! Form classification and page segmentation.
//!
//! Input is page-level text (PDF/OCR extraction happens upstream). Each page
//! is matched against a fixed table of text signals (form names and the OMB
//! control numbers printed on every IRS form) and contiguous pages of one
//! type merge into a segment. A consolidated brokerage statement therefore
//! yields one segment per 1099 section instead of a single blob.
//!
//! Classification is pure string matching over the input: identical page
//! text always produces identical segmentation, which keeps re-extraction
//! idempotent. Pages nothing matches are never dropped; they either extend
//! the preceding form (multi-page K-1s) or surface as an `unknown` segment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::FormType;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("document contains no classifiable page text")]
    UnclassifiableDocument,
}

/// Text of one page, extracted upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

/// A contiguous page range believed to be one form instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub form_type: FormType,
    /// Inclusive (first, last) page numbers.
    pub pages: (u32, u32),
    pub confidence: f32,
}

/// Confidence for a page matching exactly one form type.
const SINGLE_HIT_CONFIDENCE: f32 = 0.9;
/// Confidence when several distinct types match the same page.
const MULTI_HIT_CONFIDENCE: f32 = 0.6;
/// Confidence for pages no signal matched.
const UNKNOWN_CONFIDENCE: f32 = 0.25;

/// Signal table, matched case-insensitively in order. OMB numbers are the
/// strongest cue, printed on the form regardless of issuer layout.
const TEXT_SIGNALS: &[(&str, FormType)] = &[
    ("1099-DA", FormType::Da1099),
    ("OMB No. 1545-2298", FormType::Da1099),
    ("W-2 Wage", FormType::W2),
    ("Wage and Tax Statement", FormType::W2),
    ("OMB No. 1545-0008", FormType::W2),
    ("1099-NEC", FormType::Nec1099),
    ("OMB No. 1545-0116", FormType::Nec1099),
    ("1099-INT", FormType::Int1099),
    ("OMB No. 1545-0112", FormType::Int1099),
    ("1099-DIV", FormType::Div1099),
    ("OMB No. 1545-0110", FormType::Div1099),
    ("1099-R", FormType::R1099),
    ("OMB No. 1545-0119", FormType::R1099),
    ("1099-B", FormType::B1099),
    ("OMB No. 1545-0715", FormType::B1099),
    ("Schedule K-1", FormType::K1),
    ("Form 1040", FormType::F1040),
];

/// Detect a single page's form type from its text.
fn detect_page(text: &str) -> Option<(FormType, f32)> {
    let lower = text.to_lowercase();

    // Count hits per type, preserving signal-table order for ties.
    let mut hits: Vec<(FormType, u32)> = Vec::new();
    for (needle, form_type) in TEXT_SIGNALS {
        if lower.contains(&needle.to_lowercase()) {
            match hits.iter_mut().find(|(ft, _)| ft == form_type) {
                Some((_, count)) => *count += 1,
                None => hits.push((*form_type, 1)),
            }
        }
    }

    match hits.len() {
        0 => None,
        1 => Some((hits[0].0, SINGLE_HIT_CONFIDENCE)),
        _ => {
            // Several form types on one page (cover sheets, consolidated
            // statements). Most hits wins; table order breaks ties.
            let best = hits
                .iter()
                .max_by_key(|(_, count)| *count)
                .map(|(ft, _)| *ft)
                .unwrap_or(hits[0].0);
            Some((best, MULTI_HIT_CONFIDENCE))
        }
    }
}

/// Segment a document's pages into form instances.
///
/// Returns at least one segment or fails. Signal-less pages extend the
/// preceding typed segment; a leading run of them (or a document nothing
/// matches) becomes an `unknown` segment so no page range is lost.
pub fn classify_pages(pages: &[PageText]) -> Result<Vec<Segment>, ClassifyError> {
    if pages.is_empty() || pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(ClassifyError::UnclassifiableDocument);
    }

    let mut segments: Vec<Segment> = Vec::new();
    let mut pending_unknown: Option<(u32, u32)> = None;

    for page in pages {
        match detect_page(&page.text) {
            Some((form_type, confidence)) => {
                if let Some((first, last)) = pending_unknown.take() {
                    segments.push(Segment {
                        form_type: FormType::Unknown,
                        pages: (first, last),
                        confidence: UNKNOWN_CONFIDENCE,
                    });
                }
                match segments.last_mut() {
                    Some(current) if current.form_type == form_type => {
                        current.pages.1 = page.number;
                        current.confidence = current.confidence.max(confidence);
                    }
                    _ => segments.push(Segment {
                        form_type,
                        pages: (page.number, page.number),
                        confidence,
                    }),
                }
            }
            None => match (segments.last_mut(), &mut pending_unknown) {
                // Continuation page of the current form.
                (Some(current), None) => current.pages.1 = page.number,
                (_, Some((_, last))) => *last = page.number,
                (None, pending) => *pending = Some((page.number, page.number)),
            },
        }
    }

    if let Some((first, last)) = pending_unknown {
        segments.push(Segment {
            form_type: FormType::Unknown,
            pages: (first, last),
            confidence: UNKNOWN_CONFIDENCE,
        });
    }

    tracing::debug!(
        segments = segments.len(),
        pages = pages.len(),
        "classified document"
    );
    Ok(segments)
}
