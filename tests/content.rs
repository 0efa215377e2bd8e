use blockscan::content::extract_blocks;
use blockscan::geo::Rgb;
use blockscan::{analyze_pdf, AnalysisConfig};
use lopdf::Document;

use crate::setup::{create_floor_plan_pdf, create_test_pdf, FloorPlanConfig};

#[test]
fn test_extract_blocks_from_pdf() {
    let bytes = create_test_pdf().expect("Failed to create test PDF");
    let doc = Document::load_mem(&bytes).unwrap();

    let (blocks, warnings) = extract_blocks(&doc);
    assert!(warnings.is_empty());
    // 5 pairs per page on 2 pages plus the one-off curve on page 1.
    assert_eq!(blocks.len(), 21);
    assert_eq!(blocks.iter().filter(|b| b.page == 1).count(), 11);
    assert!(blocks.iter().all(|b| !b.commands.contains("Tj")));

    let chair = &blocks[0];
    assert_eq!(chair.commands, "0 0 1 RG\n0 0 m\n20 0 l\n20 20 l\n0 20 l\nh\nS");
    assert_eq!(chair.color, Some(Rgb::new(0.0, 0.0, 1.0)));
    assert_eq!(blocks[1].color, Some(Rgb::new(1.0, 0.0, 0.0)));
}

#[test]
fn test_outer_flip_reaches_block_transform() {
    let bytes = create_test_pdf().unwrap();
    let doc = Document::load_mem(&bytes).unwrap();
    let (blocks, _) = extract_blocks(&doc);

    let flipped = blocks.iter().find(|b| b.page == 2).unwrap();
    assert_eq!(flipped.transform.d, -1.0);
    assert_eq!(flipped.transform.f, 842.0 - 100.0);
}

#[test]
fn test_analyze_pdf_end_to_end() {
    let bytes = create_test_pdf().unwrap();
    let analysis = analyze_pdf(&bytes, &AnalysisConfig::default()).unwrap();

    assert_eq!(analysis.metadata.pages, 2);
    assert_eq!(analysis.metadata.unique_shapes, 3);
    assert_eq!(analysis.metadata.repeated_shapes, 2);
    assert_eq!(analysis.groups.len(), 1);
    assert_eq!(analysis.groups[0].composition, vec![1, 2]);
    assert_eq!(analysis.groups[0].count, 10);
    assert_eq!(analysis.groups_on_page(1).count(), 5);
    assert_eq!(analysis.groups_on_page(2).count(), 5);
    assert!(analysis.warnings.is_empty());
}

#[test]
fn test_too_few_pairs_for_support() {
    let config = FloorPlanConfig {
        pages: 1,
        pairs_per_page: 2,
        ..Default::default()
    };
    let bytes = create_floor_plan_pdf(&config).unwrap();
    let analysis = analyze_pdf(&bytes, &AnalysisConfig::default()).unwrap();
    assert_eq!(analysis.metadata.total_instances, 5);
    assert!(analysis.groups.is_empty());
}

#[test]
fn test_invalid_config_rejected_before_loading() {
    let config = AnalysisConfig {
        min_group_size: 1,
        ..Default::default()
    };
    assert!(analyze_pdf(b"not a pdf", &config).is_err());
}
