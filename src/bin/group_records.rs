use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Local;
use clap::{Parser, Subcommand};
use env_logger::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};

use dcmgroup::config::subsystems::{parse_level, GroupingVariant, ScanMode};
use dcmgroup::utils::MemoryManager;
use dcmgroup::{
    ClusterConfig, ComparisonMetrics, DicomHeader, DistanceMatrix, DistanceMatrixBuilder,
    ExactEquivalence, MatrixStorage, Record, RecordDistance, RecordGrouper,
};

#[derive(Parser, Debug)]
#[command(name = "group_records", version, about = "Group DICOM headers describing the same acquisition")]
struct Cli {
    /// INI configuration file
    #[arg(short, long, value_name = "FILE", default_value = "default.ini")]
    config: PathBuf,

    /// JSON array of headers (overrides [files] records_path)
    #[arg(short, long, value_name = "FILE")]
    records: Option<PathBuf>,

    /// Output directory (overrides [files] output_dir)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// error, warn, info, debug, trace or none
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Group exactly equivalent records
    Groups {
        /// removal or anchor
        #[arg(long)]
        variant: Option<String>,
        /// Skip the first remaining record when scanning (removal only)
        #[arg(long)]
        skip_first: bool,
    },

    /// Compute the pairwise distance matrix
    Matrix {
        /// Use sparse storage regardless of size
        #[arg(long)]
        sparse: bool,
        /// Worker threads (0 uses all cores)
        #[arg(long)]
        threads: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = if cli.config.exists() {
        ClusterConfig::from_ini(&cli.config)?
    } else {
        println!("Config file {:?} not found, using defaults", cli.config);
        ClusterConfig::default()
    };

    if let Some(path) = cli.records {
        config.files.records_path = path;
    }
    if let Some(dir) = cli.output_dir {
        config.files.output_dir = dir;
    }
    if let Some(level) = cli.log_level {
        if parse_level(&level).is_none() {
            return Err(format!("Invalid log level: {}", level).into());
        }
        config.general.log_level = level;
    }
    match &cli.command {
        Commands::Groups { variant, skip_first } => {
            if let Some(name) = variant {
                config.grouping.variant = GroupingVariant::from_str(name)
                    .ok_or_else(|| format!("Invalid variant (removal/anchor): {}", name))?;
            }
            if *skip_first {
                config.grouping.scan_mode = ScanMode::SkipFirst;
            }
        }
        Commands::Matrix { sparse, threads } => {
            config.matrix.force_sparse |= *sparse;
            if let Some(threads) = threads {
                config.matrix.threads = *threads;
            }
        }
    }
    config.validate()?;
    config.files.ensure_directories()?;

    init_logging(&config)?;
    info!("Starting {} run", match cli.command {
        Commands::Groups { .. } => "grouping",
        Commands::Matrix { .. } => "matrix",
    });
    MemoryManager::log_memory_status();

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        if !handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("Interrupt received, stopping after the current step");
        }
    })?;

    let records = load_records(&config.files.records_path)?;
    info!("Loaded {} records from {:?}", records.len(), config.files.records_path);

    let metrics = Arc::new(ComparisonMetrics::new());
    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})\n{msg}")?
        .progress_chars("#>-"));

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let start_time = Instant::now();

    match cli.command {
        Commands::Groups { .. } => {
            let equivalence = ExactEquivalence::from_config(&config)?.with_metrics(metrics.clone());
            let grouper = RecordGrouper::new(equivalence, &config.grouping).with_cancellation(cancel);

            let grouping = grouper.group(&records, Some(&pb))?;
            pb.finish_with_message(format!("{} groups", grouping.len()));

            let output_path = config.files.output_dir.join(format!("groups_{}.json", timestamp));
            let writer = BufWriter::new(File::create(&output_path)?);
            serde_json::to_writer_pretty(writer, &grouping)?;
            info!("Wrote {} groups covering {} records to {:?}",
                  grouping.len(), grouping.record_count(), output_path);
        }
        Commands::Matrix { .. } => {
            let distance = RecordDistance::from_config(&config)?.with_metrics(metrics.clone());
            let builder = DistanceMatrixBuilder::new(distance, config.matrix.clone())?
                .with_cancellation(cancel);

            let matrix = builder.build(&records, Some(&pb))?;
            pb.finish_with_message(format!("{}x{} matrix", records.len(), records.len()));

            let output_path = config.files.output_dir.join(format!("matrix_{}.csv", timestamp));
            write_matrix_csv(&output_path, &records, &matrix)?;
            info!("Wrote distance matrix to {:?}", output_path);
        }
    }

    metrics.log_summary("Comparisons");
    info!("Finished in {:.2?}", start_time.elapsed());
    Ok(())
}

fn init_logging(config: &ClusterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_level: LevelFilter = config.general.get_log_level();

    let mut builder = Builder::new();
    builder
        .filter(None, log_level)
        .format(|buf, record| {
            writeln!(buf, "{} [{}] {}",
                     Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                     record.level(),
                     record.args())
        });

    if config.general.log_to_file {
        fs::create_dir_all(&config.files.log_dir)?;
        let log_path = config.files.log_dir
            .join(format!("group_records_{}.log", Local::now().format("%m_%d_%H_%M")));
        let log_file = File::create(&log_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
        println!("Logging to {:?}", log_path);
    }

    builder.init();
    Ok(())
}

fn load_records(path: &Path) -> Result<Vec<DicomHeader>, Box<dyn std::error::Error>> {
    let file = File::open(path)
        .map_err(|e| format!("Failed to open records file {:?}: {}", path, e))?;
    let records: Vec<DicomHeader> = serde_json::from_reader(BufReader::new(file))?;
    if records.is_empty() {
        warn!("No records found in {:?}", path);
    }
    Ok(records)
}

/// Dense matrices are written as a full grid. Sparse ones are written as
/// `row,col,distance` triplets of the stored cells.
fn write_matrix_csv(
    path: &Path,
    records: &[DicomHeader],
    matrix: &MatrixStorage,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    let ids: Vec<String> = records.iter().map(|r| r.id().to_string()).collect();
    let (n, _) = matrix.shape();

    if matrix.is_sparse() {
        writer.write_record(["row", "col", "distance"])?;
        for i in 0..n {
            for j in (i + 1)..n {
                let value = matrix.get(i, j);
                if value != 0.0 {
                    writer.write_record([ids[i].as_str(), ids[j].as_str(), &value.to_string()])?;
                }
            }
        }
    } else {
        let mut header = Vec::with_capacity(n + 1);
        header.push("record".to_string());
        header.extend(ids.iter().cloned());
        writer.write_record(&header)?;

        for (i, id) in ids.iter().enumerate() {
            let mut row = Vec::with_capacity(n + 1);
            row.push(id.clone());
            row.extend((0..n).map(|j| matrix.get(i, j).to_string()));
            writer.write_record(&row)?;
        }
    }

    writer.flush()?;
    Ok(())
}
