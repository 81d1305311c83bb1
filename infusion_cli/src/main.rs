use clap::{Parser, Subcommand, ValueEnum};
use infusion_core::codec::{parse_location, parse_number};
use infusion_core::document::DrugDocument;
use infusion_core::*;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "infusion")]
#[command(about = "Infusion rate converter for weight-based drips", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Fetch drug configuration from this URL instead of the configured one
    #[arg(long, global = true, conflicts_with = "config_file")]
    config_url: Option<String>,

    /// Load drug configuration from a local JSON document
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Use the built-in drug table only
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Forward,
    Reverse,
}

#[derive(Clone, Copy, ValueEnum)]
enum LangArg {
    En,
    Th,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert between dose-rate and infusion rate (default)
    Calc {
        /// Shared link or query such as "?drug=levophed&b=70"
        location: Option<String>,

        /// Drug id or synonym
        #[arg(long)]
        drug: Option<String>,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Concentration as mg:mL, e.g. 4:100
        #[arg(long)]
        conc: Option<String>,

        /// Patient weight (kg)
        #[arg(long)]
        weight: Option<String>,

        /// Dose-rate (mcg/kg/min), forward mode input
        #[arg(long)]
        dose: Option<String>,

        /// Infusion rate (mL/hr), reverse mode input
        #[arg(long)]
        rate: Option<String>,

        #[arg(long, value_enum)]
        lang: Option<LangArg>,

        /// Ampule index in the preparation guide (0-based)
        #[arg(long)]
        ampule: Option<usize>,

        /// Total bag volume (mL)
        #[arg(long)]
        total: Option<u32>,

        /// Print the view as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the active drug table
    Drugs,

    /// Check a drug configuration document without applying it
    Validate {
        file: PathBuf,
    },
}

/// Everything a command needs after startup
struct Runtime {
    config: Config,
    registry: ConfigRegistry,
    loader: ConfigLoader,
    source: Option<Box<dyn ConfigSource>>,
}

fn main() -> Result<()> {
    // Initialize logging
    infusion_core::logging::init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Some(Commands::Validate { file }) => cmd_validate(file),
        Some(Commands::Drugs) => {
            let mut runtime = Runtime::new(config, &cli.config_url, &cli.config_file, cli.offline)?;
            let mut session = Session::initial(&runtime.registry, runtime.config.ui.language)?;
            runtime.refresh(&mut session);
            cmd_drugs(&runtime)
        }
        Some(Commands::Calc {
            location,
            drug,
            mode,
            conc,
            weight,
            dose,
            rate,
            lang,
            ampule,
            total,
            json,
        }) => {
            let runtime = Runtime::new(config, &cli.config_url, &cli.config_file, cli.offline)?;
            let args = CalcArgs {
                location,
                drug,
                mode,
                conc,
                weight,
                dose,
                rate,
                lang,
                ampule,
                total,
                json,
            };
            cmd_calc(runtime, args)
        }
        None => {
            // Default to "calc" with no inputs
            let runtime = Runtime::new(config, &cli.config_url, &cli.config_file, cli.offline)?;
            cmd_calc(runtime, CalcArgs::default())
        }
    }
}

impl Runtime {
    fn new(
        config: Config,
        config_url: &Option<String>,
        config_file: &Option<PathBuf>,
        offline: bool,
    ) -> Result<Self> {
        let source: Option<Box<dyn ConfigSource>> = if offline {
            None
        } else if let Some(path) = config_file {
            Some(Box::new(FileSource::new(path)))
        } else if let Some(url) = config_url {
            Some(Box::new(HttpSource::new(url, config.remote.timeout_secs)?))
        } else if config.remote.refresh_on_start {
            match &config.remote.url {
                Some(url) => Some(Box::new(HttpSource::new(url, config.remote.timeout_secs)?)),
                None => None,
            }
        } else {
            None
        };

        match &source {
            Some(source) => tracing::debug!("Drug config source: {}", source.describe()),
            None => tracing::debug!("No drug config source, using built-in table"),
        }

        Ok(Self {
            config,
            registry: get_default_registry().clone(),
            loader: ConfigLoader::new(),
            source,
        })
    }

    /// Startup refresh; failures only change the status line
    fn refresh(&mut self, session: &mut Session) -> LoadStatus {
        match &self.source {
            Some(source) => self.loader.refresh(source.as_ref(), &mut self.registry, session),
            None => self.loader.status().status,
        }
    }
}

#[derive(Default)]
struct CalcArgs {
    location: Option<String>,
    drug: Option<String>,
    mode: Option<ModeArg>,
    conc: Option<String>,
    weight: Option<String>,
    dose: Option<String>,
    rate: Option<String>,
    lang: Option<LangArg>,
    ampule: Option<usize>,
    total: Option<u32>,
    json: bool,
}

fn cmd_calc(mut runtime: Runtime, args: CalcArgs) -> Result<()> {
    let base = runtime.config.share_base()?;
    let location = match &args.location {
        Some(raw) => Some(
            parse_location(raw)
                .ok_or_else(|| Error::Other(format!("Cannot read location '{}'", raw)))?,
        ),
        None => None,
    };

    let language = match args.lang {
        Some(LangArg::En) => Language::En,
        Some(LangArg::Th) => Language::Th,
        None => runtime.config.ui.language,
    };

    let mut session = boot_session(location.as_ref(), &runtime.registry, language)?;
    if runtime.refresh(&mut session) == LoadStatus::Live {
        // Re-read the link against the live table
        session = boot_session(location.as_ref(), &runtime.registry, language)?;
    }
    let registry = &runtime.registry;
    let mut writes = UrlDebouncer::new(runtime.config.ui.debounce_window());

    if let Some(slug) = &args.drug {
        if !session.on_drug_change(registry, slug) {
            eprintln!("Unknown drug: {}. Keeping {}.", slug, session.selected_drug_id);
        }
        writes.schedule(Instant::now());
    }
    if let Some(mode) = args.mode {
        session.set_mode(match mode {
            ModeArg::Forward => Mode::Forward,
            ModeArg::Reverse => Mode::Reverse,
        });
        writes.schedule(Instant::now());
    }
    if args.lang.is_some() {
        session.set_language(language);
        writes.schedule(Instant::now());
    }
    if let Some(conc) = &args.conc {
        if !session.on_concentration_change(registry, conc) {
            eprintln!(
                "Concentration {} is not offered for {}. Keeping {}.",
                conc, session.selected_drug_id, session.selected_concentration
            );
        }
        writes.schedule(Instant::now());
    }
    if let Some(raw) = &args.weight {
        session.set_weight(parse_number(raw));
        writes.schedule(Instant::now());
    }
    if let Some(raw) = &args.dose {
        session.set_dose_rate(parse_number(raw));
        writes.schedule(Instant::now());
    }
    if let Some(raw) = &args.rate {
        session.set_infusion_rate(parse_number(raw));
        writes.schedule(Instant::now());
    }

    session.resolve_prep(registry)?;
    if let Some(index) = args.ampule {
        session.select_ampule(registry, index)?;
        writes.schedule(Instant::now());
    }
    if let Some(total) = args.total {
        session.select_total(registry, total)?;
        writes.schedule(Instant::now());
    }

    let view = recalc(&session, registry)?;
    let link = share_url(&base, &session);
    // The process exits after printing, so any pending write lands now
    let changed = writes.flush();
    tracing::debug!(
        "Share link {} (quiet period {:?})",
        if changed { "rewritten from flags" } else { "unchanged" },
        writes.window()
    );
    let status = runtime.loader.status();

    if args.json {
        let output = serde_json::json!({
            "view": view,
            "share_url": link.as_str(),
            "share_url_changed": changed,
            "config": status,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        display_view(&view, &session, &status);
        println!("  Share: {}", link);
        println!();
    }

    Ok(())
}

/// Start from a shared link when one was given, otherwise from the first
/// drug with its default dose
fn boot_session(
    location: Option<&url::Url>,
    registry: &ConfigRegistry,
    language: Language,
) -> Result<Session> {
    match location {
        Some(location) => hydrate(location, registry, language),
        None => Session::initial(registry, language),
    }
}

fn cmd_drugs(runtime: &Runtime) -> Result<()> {
    let registry = &runtime.registry;
    for drug in registry.drugs() {
        let max = drug
            .dose_max
            .map(|m| m.to_string())
            .unwrap_or_else(|| "no max".to_string());
        let concentrations: Vec<&str> = drug.concentrations.iter().map(|c| c.as_str()).collect();
        println!(
            "{:<12} {:<28} {} to {} mcg/kg/min  [{}]",
            drug.id,
            drug.display_name,
            drug.dose_min,
            max,
            concentrations.join(", ")
        );
    }

    let status = runtime.loader.status();
    println!();
    println!("{} drugs ({})", registry.len(), status_line(&status));
    Ok(())
}

fn cmd_validate(file: PathBuf) -> Result<()> {
    let body = std::fs::read_to_string(&file)?;
    let document = DrugDocument::parse(&body)?;
    let problems = document.validate();

    if !problems.is_empty() {
        eprintln!("{} is not a usable drug configuration:", file.display());
        for problem in &problems {
            eprintln!("  - {}", problem);
        }
        return Err(Error::Validation(problems));
    }

    println!("✓ {} drugs valid in {}", document.len(), file.display());
    if let Some(version) = document.data_version {
        println!("  Data version: {}", version.to_rfc3339());
    }
    Ok(())
}

fn status_line(status: &StatusReport) -> String {
    let label = match status.status {
        LoadStatus::Local => "built-in table",
        LoadStatus::Loading => "loading",
        LoadStatus::Live => "live",
        LoadStatus::Error => "refresh failed, using previous table",
    };
    match (&status.last_updated, status.status) {
        (Some(ts), LoadStatus::Live) => format!("{}, updated {}", label, ts),
        _ => label.to_string(),
    }
}

fn display_view(view: &Recalc, session: &Session, status: &StatusReport) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", view.drug_name);
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  {}", view.mode_label);
    println!("  Concentration: {}", session.selected_concentration);
    match session.weight_kg {
        Some(b) => println!("  Weight: {:.1} kg", b),
        None => println!("  Weight: —"),
    }
    if !view.factor.is_empty() {
        println!("  Q: {} mL/hr per mcg/kg/min", view.factor);
    }
    println!();
    println!("  {}: {}", view.title, view.value);
    println!("  [{}] {}", view.status_label, view.range_text);
    println!("  {}", view.limits_text);
    println!();

    let prep = &view.prep;
    println!("  {}", prep.title);
    for ampule in &prep.ampules {
        let marker = if ampule.active { "→" } else { " " };
        println!("  {} {}", marker, ampule.label);
    }
    let totals: Vec<String> = prep
        .totals
        .iter()
        .map(|t| match (t.active, t.enabled) {
            (true, _) => format!("[{}]", t.volume_ml),
            (false, true) => t.volume_ml.to_string(),
            (false, false) => format!("({})", t.volume_ml),
        })
        .collect();
    println!("    Total (mL): {}", totals.join(" "));
    if !prep.drug_volume.is_empty() {
        println!(
            "    Drug: {} mL  Solvent: {} mL",
            prep.drug_volume, prep.solvent_volume
        );
    }
    if prep.infeasible {
        println!("    ⚠ Drug volume exceeds the bag; choose a larger total");
    }
    if let Some(note) = &prep.note {
        let marker = if prep.critical { "⚠" } else { "ℹ" };
        println!("    {} {}", marker, note);
    }
    println!();
    println!("  Config: {}", status_line(status));
}
