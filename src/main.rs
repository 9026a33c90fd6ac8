use arrow_polish::evaluator::{EvaluatorState, MappedRead, Read, Strand};
use arrow_polish::integrator::{Integrator, IntegratorConfig};
use arrow_polish::model::{Chemistry, Model, Snr};
use arrow_polish::polish::{self, PolishConfig, RepeatConfig};
use arrow_polish::{error, fasta};
use clap::{App, Arg, ArgMatches};
#[macro_use]
extern crate log;
use std::io::{BufWriter, Write};

fn to_io_error(e: error::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

fn parse<T>(matches: &ArgMatches, name: &str) -> std::io::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = matches.value_of(name).unwrap_or_default();
    value.parse().map_err(|e: T::Err| {
        let message = format!("--{} {}:{}", name, value, e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, message)
    })
}

fn polish_template(matches: &ArgMatches) -> std::io::Result<()> {
    let template = fasta::read_fasta(&matches.value_of("template"))?;
    let template = template.first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty template file")
    })?;
    let reads = fasta::read_fasta(&matches.value_of("reads"))?;
    let snr: Snr = parse(matches, "snr")?;
    let chemistry: Chemistry = parse(matches, "chemistry")?;
    let min_z_score: f64 = parse(matches, "min_zscore")?;
    let iterations: usize = parse(matches, "iterations")?;
    let model = Model::new(chemistry, snr);
    let config = IntegratorConfig {
        min_z_score,
        ..IntegratorConfig::default()
    };
    debug!("Template\t{}\t{}bp", template.id, template.seq.len());
    debug!("Model\t{}\t{:?}", chemistry, snr);
    let mut ai: Integrator = Integrator::new(&template.seq, config).map_err(to_io_error)?;
    let len = ai.len();
    let reverse = reads.iter().filter(|r| r.strand() == Strand::Reverse);
    debug!("Reads\t{}\tReverse\t{}", reads.len(), reverse.count());
    for record in reads.iter() {
        let read = Read::new(&record.id, &record.seq, model);
        let read = MappedRead::new(read, record.strand(), 0, len, true, true);
        match ai.add_read(&read) {
            Ok(EvaluatorState::Valid) => {}
            Ok(state) => debug!("Read\t{}\t{}", record.id, state),
            Err(why) => warn!("Read\t{}\t{}", record.id, why),
        }
    }
    let dispositions = ai.dispositions();
    if dispositions.success == 0 {
        warn!("No read could be used. The template is not polished.");
    }
    let polish_config = PolishConfig {
        maximum_iterations: iterations,
        ..PolishConfig::default()
    };
    let mut result = polish::polish(&mut ai, &polish_config).map_err(to_io_error)?;
    if matches.is_present("repeats") {
        let repeat_config = RepeatConfig {
            maximum_iterations: iterations,
            ..RepeatConfig::default()
        };
        result += polish::polish_repeats(&mut ai, &repeat_config).map_err(to_io_error)?;
    }
    if !result.has_converged {
        warn!("{} did not converge in {} rounds", template.id, iterations);
    }
    info!(
        "Tested\t{}\tApplied\t{}\tAvgZ\t{:.3}",
        result.mutations_tested,
        result.mutations_applied,
        ai.avg_z_score()
    );
    warn!("Dispositions\n{}", ai.dispositions());
    let qvs = polish::consensus_qvs(&mut ai).map_err(to_io_error)?;
    let stdout = std::io::stdout();
    let mut wtr = BufWriter::new(stdout.lock());
    let id = format!("{}|arrow", template.id);
    fasta::write_fastq(&mut wtr, &id, ai.template(), &qvs)?;
    wtr.flush()
}

fn main() -> std::io::Result<()> {
    let matches = App::new("arrow-polish")
        .version("0.1")
        .author("Bansho Masutani")
        .about("Polish:[FASTA]x[FASTA]->[FASTQ]")
        .setting(clap::AppSettings::ArgRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Debug mode"),
        )
        .arg(
            Arg::with_name("template")
                .long("template")
                .short("t")
                .value_name("FASTA")
                .takes_value(true)
                .required(true)
                .help("Draft template. The first record is polished. FASTA format."),
        )
        .arg(
            Arg::with_name("reads")
                .long("reads")
                .short("r")
                .value_name("FASTA")
                .takes_value(true)
                .help("Reads spanning the template. `strand=-` in the header for reverse. [stdin]"),
        )
        .arg(
            Arg::with_name("snr")
                .long("snr")
                .takes_value(true)
                .default_value("10,7,5,11")
                .help("SNR of A,C,G,T channels."),
        )
        .arg(
            Arg::with_name("chemistry")
                .long("chemistry")
                .takes_value(true)
                .default_value("P6-C4")
                .possible_values(&["P6-C4", "S/P1-C1/beta"])
                .help("Sequencing chemistry."),
        )
        .arg(
            Arg::with_name("min_zscore")
                .long("min_zscore")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("-3.5")
                .help("Reads with lower z-score are discarded. NaN to keep all."),
        )
        .arg(
            Arg::with_name("iterations")
                .long("iterations")
                .takes_value(true)
                .default_value("40")
                .help("Maximum number of polishing rounds."),
        )
        .arg(
            Arg::with_name("repeats")
                .long("repeats")
                .help("Polish tandem repeats after single base polishing."),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .short("p")
                .takes_value(true)
                .default_value("1")
                .help("Number of threads"),
        )
        .get_matches();
    let level = match matches.occurrences_of("verbose") {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    let threads: usize = parse(&matches, "threads")?;
    if let Err(why) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        debug!("{:?}", why);
    }
    debug!("Start");
    polish_template(&matches)
}
