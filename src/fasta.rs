//! Thin FASTA reader and FASTQ writer for the binary. Batch IO only.
use crate::evaluator::Strand;
use std::io::{BufRead, BufReader, Read};
use std::io::{BufWriter, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

impl Record {
    /// Reverse if the description carries `strand=-`.
    pub fn strand(&self) -> Strand {
        let reverse = self
            .desc
            .as_ref()
            .map(|desc| desc.split_whitespace().any(|field| field == "strand=-"))
            .unwrap_or(false);
        if reverse {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }
}

/// Read a file, or stdin if `file` is None.
pub fn read_fasta<P: AsRef<std::path::Path>>(file: &Option<P>) -> std::io::Result<Vec<Record>> {
    let stdin = std::io::stdin();
    let mut reader: Box<dyn BufRead> = match file {
        Some(file) => std::fs::File::open(file)
            .map(BufReader::new)
            .map(Box::new)?,
        None => Box::new(BufReader::new(stdin.lock())),
    };
    let mut contents = vec![];
    reader.read_to_end(&mut contents)?;
    Ok(parse_fasta(&contents))
}

/// Malformed records are skipped.
fn parse_fasta(contents: &[u8]) -> Vec<Record> {
    contents
        .split(|&x| x == b'>')
        .skip(1)
        .filter_map(|record| {
            let mut record = record.splitn(2, |&x| x == b'\n');
            let header = String::from_utf8_lossy(record.next()?);
            let mut header = header.trim_end().splitn(2, ' ');
            let id = header.next()?.to_string();
            let desc = header.next().map(|desc| desc.to_string());
            let seq: Vec<_> = record
                .next()?
                .iter()
                .filter(|x| !x.is_ascii_whitespace())
                .map(u8::to_ascii_uppercase)
                .collect();
            Some(Record { id, desc, seq })
        })
        .collect()
}

/// Phred+33 encoding of `qvs`, capped at 93.
pub fn qvs_to_ascii(qvs: &[i32]) -> Vec<u8> {
    qvs.iter().map(|&qv| qv.max(0).min(93) as u8 + 33).collect()
}

pub fn write_fastq<W: Write>(
    wtr: &mut BufWriter<W>,
    id: &str,
    seq: &[u8],
    qvs: &[i32],
) -> std::io::Result<()> {
    let seq = String::from_utf8_lossy(seq);
    let qual = qvs_to_ascii(qvs);
    let qual = String::from_utf8_lossy(&qual);
    writeln!(wtr, "@{}\n{}\n+\n{}", id, seq, qual)
}
