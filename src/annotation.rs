use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Gtf,
    Gff3,
}

/// One annotated feature (gene, CDS, ...) on a replicon.
///
/// Coordinates are 1-based inclusive, as in the source GTF/GFF.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: String,
    pub seqname: String,
    pub feature_type: String,
    pub start: u32,
    pub end: u32,
    pub strand: char,
}

impl Feature {
    pub fn length(&self) -> u32 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }
}

pub fn detect_format(path: &Path) -> Result<InputFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "gtf" => Ok(InputFormat::Gtf),
        "gff" | "gff3" => Ok(InputFormat::Gff3),
        _ => Err(anyhow!(
            "unable to detect annotation format from extension: .{}",
            ext
        )),
    }
}

/// Load all features from a GTF/GFF file. Callers filter by feature type.
pub fn load_features(path: &Path) -> Result<Vec<Feature>> {
    match detect_format(path)? {
        InputFormat::Gtf => load_gtf(path),
        InputFormat::Gff3 => load_gff3(path),
    }
}

fn load_gtf(path: &Path) -> Result<Vec<Feature>> {
    // NOTE: record_bufs yields gff::feature::RecordBuf, which provides a
    // uniform API across both formats.
    let reader = File::open(path)?;
    let mut reader = noodles::gtf::io::Reader::new(BufReader::new(reader));

    let mut features = Vec::new();
    for result in reader.record_bufs() {
        let record = result?;
        let feature_type = String::from_utf8_lossy(record.ty().as_ref()).to_string();
        let attrs = record.attributes();
        let id = get_record_buf_attribute(attrs, b"gene_id")
            .or_else(|| get_record_buf_attribute(attrs, b"transcript_id"))
            .ok_or_else(|| anyhow!("missing gene_id in GTF attributes"))?;
        features.push(Feature {
            id,
            seqname: record.reference_sequence_name().to_string(),
            feature_type,
            start: u32::try_from(record.start().get())
                .map_err(|_| anyhow!("GTF start out of range"))?,
            end: u32::try_from(record.end().get())
                .map_err(|_| anyhow!("GTF end out of range"))?,
            strand: strand_to_char(record.strand()),
        });
    }
    Ok(features)
}

fn load_gff3(path: &Path) -> Result<Vec<Feature>> {
    let reader = File::open(path)?;
    let mut reader = noodles::gff::io::Reader::new(BufReader::new(reader));

    let mut features = Vec::new();
    for result in reader.record_bufs() {
        let record = result?;
        let feature_type = String::from_utf8_lossy(record.ty().as_ref()).to_string();
        let attrs = record.attributes();
        let id = get_record_buf_attribute(attrs, b"ID")
            .or_else(|| get_record_buf_attribute(attrs, b"locus_tag"))
            .or_else(|| get_record_buf_attribute(attrs, b"Name"))
            .unwrap_or_else(|| {
                format!(
                    "{}:{}-{}",
                    record.reference_sequence_name(),
                    record.start().get(),
                    record.end().get()
                )
            });
        features.push(Feature {
            id,
            seqname: record.reference_sequence_name().to_string(),
            feature_type,
            start: u32::try_from(record.start().get())
                .map_err(|_| anyhow!("GFF3 start out of range"))?,
            end: u32::try_from(record.end().get())
                .map_err(|_| anyhow!("GFF3 end out of range"))?,
            strand: strand_to_char(record.strand()),
        });
    }
    Ok(features)
}

fn get_record_buf_attribute(
    attrs: &noodles::gff::feature::record_buf::Attributes,
    key: &[u8],
) -> Option<String> {
    let value = attrs.get(key)?;
    value.iter().next().map(|v| v.to_string())
}

fn strand_to_char(strand: noodles::gff::feature::record::Strand) -> char {
    use noodles::gff::feature::record::Strand;
    match strand {
        Strand::Forward => '+',
        Strand::Reverse => '-',
        Strand::None => '.',
        Strand::Unknown => '?',
    }
}
