use readflow::cli::{CommonArgs, CoverageArgs, GeneQuantiArgs};
use readflow::config::{CoverageConfig, GeneQuantiConfig};
use readflow::coverage::compute_coverage;
use readflow::project::RepliconGroup;
use readflow::quanti::quantify;
use readflow::annotation::Feature;
use rust_htslib::bam::record::Aux;
use rust_htslib::bam::{self, header::HeaderRecord, record::Cigar, record::CigarString, Format};
use std::fs;
use std::path::{Path, PathBuf};

fn common() -> CommonArgs {
    CommonArgs {
        project_path: PathBuf::from("."),
        processes: 1,
        check_for_existing_files: false,
        progress: false,
        abort_on_first_failure: false,
    }
}

/// BAM with two replicons; records are (qname, tid, 0-based pos, reverse, nh).
fn write_test_bam(path: &Path, records: &[(&[u8], i32, i64, bool, i32)]) {
    let mut header = bam::Header::new();
    for name in ["chr", "plasmid"] {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", name);
        sq.push_tag(b"LN", 500);
        header.push_record(&sq);
    }
    let mut writer = bam::Writer::from_path(path, &header, Format::Bam).unwrap();
    for (qname, tid, pos, reverse, nh) in records {
        let mut rec = bam::Record::new();
        rec.set(
            qname,
            Some(&CigarString(vec![Cigar::Match(10)])),
            b"ACGTACGTAC",
            &[30u8; 10],
        );
        rec.set_tid(*tid);
        rec.set_pos(*pos);
        rec.unset_unmapped();
        if *reverse {
            rec.set_reverse();
        }
        rec.push_aux(b"NH", Aux::I32(*nh)).unwrap();
        writer.write(&rec).unwrap();
    }
}

fn group() -> RepliconGroup {
    RepliconGroup {
        name: "org".to_string(),
        fasta: PathBuf::from("org.fa"),
        replicons: vec!["chr".to_string(), "plasmid".to_string()],
    }
}

#[test]
fn coverage_splits_strands_and_weights_by_hits() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("in.bam");
    // forward unique at 100..110, reverse NH=2 at 200..210.
    write_test_bam(
        &bam_path,
        &[(b"f", 0, 100, false, 1), (b"r", 0, 200, true, 2)],
    );

    let config = CoverageConfig::from_args(&CoverageArgs {
        common: common(),
        unique_only: false,
        first_base_only: false,
    })
    .unwrap();

    let out = dir.path().join("cov.wig");
    let stats = compute_coverage(&bam_path, &group(), &config, &out).unwrap();
    assert_eq!(stats.alignments_counted, 2);

    let wig = fs::read_to_string(&out).unwrap();
    assert!(wig.contains("track type=wiggle_0 name=\"org_forward\""));
    assert!(wig.contains("track type=wiggle_0 name=\"org_reverse\""));
    // Forward base 101 (1-based) has coverage 1; reverse base 201 has -0.5.
    assert!(wig.contains("\n101 1\n"));
    assert!(wig.contains("\n201 -0.5\n"));
}

#[test]
fn unique_only_skips_multimapped_alignments() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("in.bam");
    write_test_bam(
        &bam_path,
        &[(b"f", 0, 100, false, 1), (b"m", 0, 200, false, 3)],
    );

    let config = CoverageConfig::from_args(&CoverageArgs {
        common: common(),
        unique_only: true,
        first_base_only: false,
    })
    .unwrap();

    let out = dir.path().join("cov.wig");
    let stats = compute_coverage(&bam_path, &group(), &config, &out).unwrap();
    assert_eq!(stats.alignments_counted, 1);
    assert_eq!(stats.alignments_skipped, 1);
}

#[test]
fn first_base_only_marks_the_five_prime_end() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("in.bam");
    write_test_bam(
        &bam_path,
        &[(b"f", 0, 100, false, 1), (b"r", 0, 200, true, 1)],
    );

    let config = CoverageConfig::from_args(&CoverageArgs {
        common: common(),
        unique_only: false,
        first_base_only: true,
    })
    .unwrap();

    let out = dir.path().join("cov.wig");
    compute_coverage(&bam_path, &group(), &config, &out).unwrap();
    let wig = fs::read_to_string(&out).unwrap();
    // Forward 5' end is the leftmost base; reverse 5' end is the rightmost.
    assert!(wig.contains("\n101 1\n"));
    assert!(!wig.contains("\n102 1\n"));
    assert!(wig.contains("\n210 -1\n"));
}

fn feature(id: &str, seqname: &str, ty: &str, start: u32, end: u32) -> Feature {
    Feature {
        id: id.to_string(),
        seqname: seqname.to_string(),
        feature_type: ty.to_string(),
        start,
        end,
        strand: '+',
    }
}

#[test]
fn quantification_honors_min_overlap_and_feature_types() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("in.bam");
    // Read spans 1-based [101, 110].
    write_test_bam(&bam_path, &[(b"read", 0, 100, false, 1)]);

    let features = vec![
        feature("geneA", "chr", "gene", 95, 120),   // overlap 10
        feature("geneB", "chr", "gene", 108, 150),  // overlap 3
        feature("rnaC", "chr", "misc_RNA", 95, 120), // wrong type
        feature("geneD", "plasmid", "gene", 1, 400), // wrong replicon for this read
    ];

    let config = GeneQuantiConfig::from_args(&GeneQuantiArgs {
        common: common(),
        min_overlap: 5,
        features: "gene".into(),
        unique_only: false,
        pseudocounts: false,
    })
    .unwrap();

    let out = dir.path().join("counts.csv");
    let stats = quantify(&bam_path, &group(), &features, &config, &out).unwrap();
    assert_eq!(stats.features_counted, 3); // geneA, geneB, geneD survive the type filter

    let table = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(
        lines[0],
        "feature,type,replicon,start,end,strand,count"
    );
    assert!(lines.iter().any(|l| l.starts_with("geneA,") && l.ends_with(",1.00")));
    // Only 3 bases of overlap: below min_overlap, not counted.
    assert!(lines.iter().any(|l| l.starts_with("geneB,") && l.ends_with(",0.00")));
    assert!(lines.iter().any(|l| l.starts_with("geneD,") && l.ends_with(",0.00")));
    assert!(!table.contains("rnaC"));
}

#[test]
fn pseudocounts_add_one_to_every_feature() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("in.bam");
    write_test_bam(&bam_path, &[(b"read", 0, 100, false, 1)]);

    let features = vec![
        feature("geneA", "chr", "gene", 95, 120),
        feature("geneB", "chr", "gene", 300, 400),
    ];
    let config = GeneQuantiConfig::from_args(&GeneQuantiArgs {
        common: common(),
        min_overlap: 1,
        features: "gene".into(),
        unique_only: false,
        pseudocounts: true,
    })
    .unwrap();

    let out = dir.path().join("counts.csv");
    quantify(&bam_path, &group(), &features, &config, &out).unwrap();
    let table = fs::read_to_string(&out).unwrap();
    assert!(table.lines().any(|l| l.starts_with("geneA,") && l.ends_with(",2.00")));
    assert!(table.lines().any(|l| l.starts_with("geneB,") && l.ends_with(",1.00")));
}
