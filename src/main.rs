use clap::{Parser, Subcommand};
use cluster_merge::config::{self, AppConfig};
use cluster_merge::imaging::{ImageBackend, RustBackend};
use cluster_merge::output;
use cluster_merge::project::Project;
use cluster_merge::project_file::ProjectFile;
use cluster_merge::scan;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cluster-merge")]
#[command(about = "Merge clusters of similar photos into one image each")]
#[command(long_about = "\
Merge clusters of similar photos into one image each

A project file lists source images and the clusters they are grouped into.
Each cluster is rendered by layering its members over each other, every
layer's opacity scaled by its weight.

Typical workflow:

  cluster-merge scan shoot/                  # See what would be picked up
  cluster-merge init shoot/                  # Write shoot/project.json
  cluster-merge show shoot/project.json      # Inspect clusters and weights
  cluster-merge generate shoot/project.json  # Render dirty clusters

Outputs land in the configured directory (default: merged/ next to the
project file) as <first-layer>_cluster_<id>.<format>.

Run 'cluster-merge gen-config' to generate a documented cluster-merge.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: cluster-merge.toml next to the project)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the images a directory contains
    Scan {
        /// Directory of source images
        dir: PathBuf,
    },
    /// Create a project file from a directory of images
    Init {
        /// Directory of source images
        dir: PathBuf,
        /// Project file to write (default: <dir>/project.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// One cluster per image instead of one cluster holding every image
        #[arg(long)]
        per_image: bool,
    },
    /// Print the entries and clusters of a project
    Show {
        /// Project file
        project: PathBuf,
    },
    /// Render dirty clusters and mark them clean
    Generate {
        /// Project file
        project: PathBuf,
        /// Render every cluster, not only dirty ones
        #[arg(long)]
        all: bool,
    },
    /// Print a stock cluster-merge.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scan { dir } => {
            let images = scan::scan_images(&dir)?;
            output::print_scan_output(&dir, &images);
        }
        Command::Init {
            dir,
            output: project_path,
            per_image,
        } => {
            let project_path = project_path.unwrap_or_else(|| dir.join("project.json"));
            let config = resolve_config(cli.config.as_deref(), &project_path)?;
            init_logging(&config)?;
            let images = scan::scan_images(&std::fs::canonicalize(&dir)?)?;
            if images.is_empty() {
                return Err(format!("no supported images in {}", dir.display()).into());
            }

            let mut project = Project::new(RustBackend::new(), 1)?;
            let ids = images
                .iter()
                .map(|path| project.add_entry(path))
                .collect::<Result<Vec<_>, _>>()?;
            if per_image {
                for id in &ids {
                    project.create_cluster(std::slice::from_ref(id))?;
                }
            } else {
                project.create_cluster(&ids)?;
            }
            write_project(&project, &project_path)?;
            output::print_project(project.entries(), project.clusters());
            println!("==> Wrote {}", project_path.display());
        }
        Command::Show { project } => {
            let file = ProjectFile::load(&project)?;
            let (entries, clusters) = file.build()?;
            output::print_project(&entries, &clusters);
        }
        Command::Generate {
            project: project_path,
            all,
        } => {
            let config = resolve_config(cli.config.as_deref(), &project_path)?;
            init_logging(&config)?;
            generate(&config, &project_path, all)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn generate(
    config: &AppConfig,
    project_path: &Path,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let workers = config::effective_workers(&config.pipeline);
    let mut project = Project::new(RustBackend::new(), workers)?;
    project.load_file(&ProjectFile::load(project_path)?)?;

    let events = project.pipeline().subscribe();
    let printer = std::thread::spawn(move || {
        for event in events {
            println!("{}", output::format_generation_event(&event));
        }
    });

    let targets = if all {
        project.clusters().ids()
    } else {
        project.clusters().dirty_ids()
    };
    if targets.is_empty() {
        println!("Nothing to generate");
    } else {
        project.generate(&targets)?;
        project.wait_for_generation();
    }

    let out_dir = base_dir(project_path).join(&config.output.directory);
    let summary = project.save_generated(&out_dir, config.output.format.extension());

    write_project(&project, project_path)?;
    // The pipeline owns the event senders; the printer ends once it is gone
    drop(project);
    printer.join().map_err(|_| "output thread panicked")?;
    output::print_generate_summary(&summary);
    Ok(())
}

fn write_project<B: ImageBackend>(
    project: &Project<B>,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = project.to_file();
    file.relativize_sources(&std::fs::canonicalize(base_dir(path))?);
    file.save(path)?;
    Ok(())
}

fn base_dir(project_path: &Path) -> &Path {
    project_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

/// `--config` wins; otherwise look next to the project file.
fn resolve_config(
    explicit: Option<&Path>,
    project_path: &Path,
) -> Result<AppConfig, config::ConfigError> {
    match explicit {
        Some(file) => config::load_config_file(file),
        None => config::load_config(base_dir(project_path)),
    }
}

fn init_logging(config: &AppConfig) -> Result<(), config::ConfigError> {
    let level = config.logging.level()?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
