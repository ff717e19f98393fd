use readflow::cli::{AlignArgs, CommonArgs, DeseqArgs, GeneQuantiArgs};
use readflow::config::{AlignConfig, DeseqConfig, GeneQuantiConfig};
use readflow::error::PipelineError;
use readflow::project::ReadFormat;
use std::path::PathBuf;

fn common() -> CommonArgs {
    CommonArgs {
        project_path: PathBuf::from("."),
        processes: 1,
        check_for_existing_files: false,
        progress: false,
        abort_on_first_failure: false,
    }
}

fn align_args() -> AlignArgs {
    AlignArgs {
        common: common(),
        min_read_length: 12,
        accuracy: 95.0,
        evalue: 5.0,
        split: false,
        paired_end: false,
        poly_a_clipping: false,
        min_phred_score: None,
        adapter: None,
        aligner_bin: PathBuf::from("segemehl.x"),
        realign: false,
        realigner_bin: None,
        crossalign_cleaning: None,
    }
}

fn assert_config_error(result: Result<impl Sized, PipelineError>, option: &str) {
    match result {
        Err(PipelineError::Config { option: o, .. }) => assert_eq!(o, option),
        Err(other) => panic!("expected Config error for `{option}`, got: {other}"),
        Ok(_) => panic!("expected Config error for `{option}`, got Ok"),
    }
}

#[test]
fn default_align_options_validate() {
    let config = AlignConfig::from_args(&align_args()).unwrap();
    assert_eq!(config.min_read_length, 12);
    assert_eq!(config.exec.processes, 1);
    assert_eq!(config.accuracy, 95.0);
    assert_eq!(config.evalue, 5.0);
    assert!(!config.crossalign.is_enabled());
}

#[test]
fn rejects_zero_processes() {
    let mut args = align_args();
    args.common.processes = 0;
    assert_config_error(AlignConfig::from_args(&args), "processes");
}

#[test]
fn rejects_negative_accuracy_and_evalue() {
    let mut args = align_args();
    args.accuracy = -1.0;
    assert_config_error(AlignConfig::from_args(&args), "accuracy");

    let mut args = align_args();
    args.evalue = -0.5;
    assert_config_error(AlignConfig::from_args(&args), "evalue");
}

#[test]
fn paired_end_excludes_poly_a_clipping() {
    let mut args = align_args();
    args.paired_end = true;
    args.poly_a_clipping = true;
    assert_config_error(AlignConfig::from_args(&args), "poly_a_clipping");
}

#[test]
fn realign_requires_realigner_binary() {
    let mut args = align_args();
    args.realign = true;
    assert_config_error(AlignConfig::from_args(&args), "realigner_bin");

    args.realigner_bin = Some(PathBuf::from("lack.x"));
    assert!(AlignConfig::from_args(&args).is_ok());
}

#[test]
fn quality_options_require_fastq_input() {
    let mut args = align_args();
    args.min_phred_score = Some(20);
    let config = AlignConfig::from_args(&args).unwrap();
    assert_config_error(
        config.validate_read_format(&[ReadFormat::Fastq, ReadFormat::Fasta]),
        "min_phred_score",
    );
    assert!(config.validate_read_format(&[ReadFormat::Fastq]).is_ok());

    let mut args = align_args();
    args.adapter = Some("ACGT".into());
    let config = AlignConfig::from_args(&args).unwrap();
    assert_config_error(config.validate_read_format(&[ReadFormat::Fasta]), "adapter");
}

#[test]
fn rejects_non_nucleotide_adapter() {
    let mut args = align_args();
    args.adapter = Some("AC-GT".into());
    assert_config_error(AlignConfig::from_args(&args), "adapter");
}

#[test]
fn malformed_crossalign_spec_fails_at_config_time() {
    let mut args = align_args();
    args.crossalign_cleaning = Some("Ecoli".into());
    assert!(matches!(
        AlignConfig::from_args(&args),
        Err(PipelineError::Parse { .. })
    ));
}

#[test]
fn gene_quanti_validates_overlap_and_features() {
    let mut args = GeneQuantiArgs {
        common: common(),
        min_overlap: 0,
        features: "gene,CDS".into(),
        unique_only: false,
        pseudocounts: false,
    };
    assert_config_error(GeneQuantiConfig::from_args(&args), "min_overlap");

    args.min_overlap = 10;
    args.features = " , ".into();
    assert_config_error(GeneQuantiConfig::from_args(&args), "features");

    args.features = "gene, CDS".into();
    let config = GeneQuantiConfig::from_args(&args).unwrap();
    assert_eq!(config.features, vec!["gene", "CDS"]);
    assert_eq!(config.min_overlap, 10);
}

#[test]
fn deseq_requires_parallel_lists() {
    let mut args = DeseqArgs {
        common: common(),
        libs: "lib1,lib2,lib3".into(),
        conditions: "ctrl,ctrl".into(),
        cooks_cutoff_off: false,
        deseq_bin: PathBuf::from("run_deseq"),
    };
    assert_config_error(DeseqConfig::from_args(&args), "conditions");

    args.conditions = "ctrl,ctrl,heat".into();
    let config = DeseqConfig::from_args(&args).unwrap();
    assert_eq!(config.libs.len(), 3);

    args.libs = "lib1,lib2,lib1".into();
    assert_config_error(DeseqConfig::from_args(&args), "libs");

    args.libs = "".into();
    args.conditions = "".into();
    assert_config_error(DeseqConfig::from_args(&args), "libs");
}
