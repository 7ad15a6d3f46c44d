use std::io::Cursor;

use doc_forensics::{
    DocumentKind, DocumentLoader, DocumentVerifier, EmbedderConfig, VerificationConfig,
    analysis::embedding::EmbeddingModel,
    detection::{
        RegionLabel,
        tampering::{MissingIn, RegionOutcome},
        template::{TemplateDetector, TemplateRegion},
    },
    report::JsonReport,
};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;

const PAGE: u32 = 600;

/// A page of random 8px cells, like printed texture and handwriting.
fn document(seed: u64) -> RgbImage {
    let cells = PAGE.div_ceil(8);
    let mut state = seed;
    let values = (0..cells * cells)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 56) as u8
        })
        .collect::<Vec<_>>();
    RgbImage::from_fn(PAGE, PAGE, |x, y| {
        let v = values[((y / 8) * cells + x / 8) as usize];
        Rgb([v, v.wrapping_add(40), 255 - v])
    })
}

/// Covers at least the pixels the layout template assigns to `relative`.
fn blank_out(image: &mut RgbImage, relative: [f32; 4]) {
    let page = PAGE as f32;
    let [x1, y1] = [relative[0], relative[1]].map(|v| (v * page).floor() as u32);
    let [x2, y2] = [relative[2], relative[3]].map(|v| ((v * page).ceil() as u32).min(PAGE));
    for y in y1..y2 {
        for x in x1..x2 {
            image.put_pixel(x, y, Rgb([250, 250, 250]));
        }
    }
}

fn verifier() -> DocumentVerifier {
    DocumentVerifier::from_config(VerificationConfig {
        embedder: EmbedderConfig::stub(),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn identical_documents_are_not_suspicious() {
    let page = document(1);
    let result = verifier().verify(&page, &page);

    assert!(!result.tampering_suspected(), "{}", result.summary());
    for verdict in result.regions() {
        let similarity = verdict.outcome.similarity().unwrap();
        assert!(similarity.embedding_score.unwrap() > 0.999);
        assert!(similarity.keypoint_match);
    }
}

#[test]
fn replaced_signature_is_suspicious() {
    let original = document(2);
    let mut forged = original.clone();
    let signature = TemplateRegion::certificate_layout()
        .into_iter()
        .find(|r| r.label == RegionLabel::Signature)
        .unwrap();
    blank_out(&mut forged, signature.relative);

    let result = verifier().verify(&original, &forged);

    assert!(result.tampering_suspected());
    assert!(!result.get(&RegionLabel::Signature).unwrap().is_match());
    assert!(result.get(&RegionLabel::Profile).unwrap().is_match());
    assert_eq!(result.suspicious_labels(), vec![&RegionLabel::Signature]);
}

#[test]
fn thin_signature_strip_on_identical_documents_matches() {
    let config = VerificationConfig {
        embedder: EmbedderConfig::stub(),
        labels: vec![RegionLabel::Signature],
        layout: vec![TemplateRegion::new("signature", [0.2, 0.8, 0.7, 0.86])],
        ..Default::default()
    };
    let verifier = DocumentVerifier::from_config(config).unwrap();
    let page = document(7);

    let result = verifier.verify(&page, &page);
    let similarity = result
        .get(&RegionLabel::Signature)
        .unwrap()
        .similarity()
        .unwrap();
    assert!(similarity.keypoint_match, "{:?}", similarity);
    assert!(!result.tampering_suspected());
}

#[test]
fn nothing_detected_yields_markers_for_every_label() {
    let detector = TemplateDetector::new(Vec::new()).unwrap();
    let config = VerificationConfig {
        embedder: EmbedderConfig::stub(),
        ..Default::default()
    };
    let verifier =
        DocumentVerifier::new(config, Box::new(detector), EmbeddingModel::stub()).unwrap();
    let page = document(3);

    let result = verifier.verify(&page, &page);
    assert_eq!(result.regions().len(), 2);
    assert!(
        result
            .regions()
            .iter()
            .all(|r| r.outcome == RegionOutcome::NotDetected(MissingIn::Both))
    );
    assert!(result.tampering_suspected());

    let json: Value =
        serde_json::from_str(&JsonReport::from(&result).to_json().unwrap()).unwrap();
    assert_eq!(
        json["results"]["profile"]["error"],
        "profile not detected in one or both images"
    );
    assert_eq!(
        json["results"]["signature"]["error"],
        "signature not detected in one or both images"
    );
    assert_eq!(json["results"]["tampering_suspected"], true);
}

#[test]
fn report_shape_for_compared_regions() {
    let page = document(4);
    let result = verifier().verify(&page, &page);
    let json: Value =
        serde_json::from_str(&JsonReport::from(&result).to_json().unwrap()).unwrap();

    let signature = &json["results"]["signature"];
    assert!(signature["deep_learning_similarity"].is_f64());
    assert_eq!(signature["deep_learning_match"], true);
    assert!(signature["sift_similarity"].is_f64());
    assert_eq!(json["results"]["tampering_suspected"], false);
}

#[test]
fn encoded_documents_round_through_loader() {
    let page = document(5);
    let mut bytes = Cursor::new(Vec::new());
    page.write_to(&mut bytes, ImageFormat::Png).unwrap();

    let loaded = DocumentLoader::new()
        .load(bytes.get_ref(), DocumentKind::Scanned)
        .unwrap();
    let result = verifier().verify(&page, &loaded);
    assert!(!result.tampering_suspected());
}

#[test]
fn whole_document_comparison_separates_pages() {
    let verifier = verifier();
    let same = verifier.compare_whole(&document(6), &document(6)).unwrap();
    assert!(same.is_same);

    let blank = RgbImage::from_pixel(PAGE, PAGE, Rgb([0, 0, 0]));
    let different = verifier.compare_whole(&document(6), &blank).unwrap();
    assert!(different.similarity < same.similarity);
}
