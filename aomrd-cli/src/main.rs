//! AOMRD channel packer CLI

use aomrd_core::analysis::AnalysisImage;
use aomrd_core::{
    export_session, smart_generate, AnalyzerConfig, AnalyzerKind, ChannelTable, ExportBundle,
    ExportEncoder, ExportResolution, ExportRole, FilteredSampler, ImageLoader, LuminanceField,
    MaterialAnalyzer, NormalMapSynthesizer, PackerConfig, PbrParameters, Session, TextureChannel,
    TextureMap,
};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// JSON output of `generate --json`
#[derive(Debug, Serialize)]
struct GenerateReport {
    parameters: PbrParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    analyzer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_reason: Option<String>,
    export: ExportBundle,
}

#[derive(Parser)]
#[command(name = "aomrd")]
#[command(about = "Pack AO, Metallic, Roughness and Displacement maps into one AOMRD texture.")]
#[command(version = concat!("v", env!("CARGO_PKG_VERSION")))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack user-supplied maps into T_AOMRD (plus T_NORMAL / T_ALPHA when given)
    Pack {
        /// Detect channel maps in a folder by filename
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Ambient occlusion map (red)
        #[arg(long)]
        ao: Option<PathBuf>,
        /// Metallic map (green)
        #[arg(long)]
        metallic: Option<PathBuf>,
        /// Roughness map (blue)
        #[arg(long)]
        roughness: Option<PathBuf>,
        /// Displacement / height map (alpha)
        #[arg(long)]
        displacement: Option<PathBuf>,
        /// Normal map, exported standalone
        #[arg(long)]
        normal: Option<PathBuf>,
        /// Alpha / opacity map, exported standalone
        #[arg(long)]
        alpha: Option<PathBuf>,
        /// Channel intensity, e.g. --intensity roughness=0.8 (0-2)
        #[arg(long, value_name = "CH=V")]
        intensity: Vec<String>,
        /// Invert a channel, e.g. --invert roughness
        #[arg(long, value_name = "CH")]
        invert: Vec<String>,
        /// Export resolution: 512, 1024, 2048, 4096, 8192 (or 1k, 2k, ...)
        #[arg(long)]
        resolution: Option<String>,
        /// Output folder (default: output_dir from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print written files as JSON
        #[arg(long)]
        json: bool,
    },
    /// Derive every map from a base color image and export them
    Generate {
        /// Base color image
        base: PathBuf,
        /// Analyzer: none, heuristic, or command
        #[arg(long)]
        analyzer: Option<String>,
        /// Force the material to metal
        #[arg(long)]
        metal: bool,
        /// Override roughness estimate (0-1)
        #[arg(long)]
        roughness: Option<f32>,
        /// Override AO intensity (0-2)
        #[arg(long)]
        ao_intensity: Option<f32>,
        /// Override displacement contrast (0-1)
        #[arg(long)]
        displacement_contrast: Option<f32>,
        /// Channel intensity, e.g. --intensity metallic=1 (0-2)
        #[arg(long, value_name = "CH=V")]
        intensity: Vec<String>,
        /// Invert a channel
        #[arg(long, value_name = "CH")]
        invert: Vec<String>,
        /// Export resolution
        #[arg(long)]
        resolution: Option<String>,
        /// Output folder (default: output_dir from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print parameters and written files as JSON
        #[arg(long)]
        json: bool,
    },
    /// Estimate PBR parameters for a base color image and print them as JSON
    Analyze {
        /// Base color image
        base: PathBuf,
        /// Analyzer: heuristic or command
        #[arg(long)]
        analyzer: Option<String>,
    },
    /// Derive a standalone normal map from a height or base color image
    Normal {
        /// Source image; its luminance is treated as height
        height: PathBuf,
        /// Export resolution
        #[arg(long)]
        resolution: Option<String>,
        /// Output folder (default: output_dir from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Per-slot adjustments given on the command line.
#[derive(Debug, Default, PartialEq)]
struct SlotSettings {
    intensities: Vec<(TextureChannel, f32)>,
    inverted: Vec<TextureChannel>,
}

impl SlotSettings {
    fn parse(intensity: &[String], invert: &[String]) -> CliResult<Self> {
        Ok(Self {
            intensities: intensity.iter().map(|s| parse_intensity(s)).collect::<CliResult<_>>()?,
            inverted: invert.iter().map(|s| parse_channel(s)).collect::<CliResult<_>>()?,
        })
    }

    fn apply_to_table(&self, table: &mut ChannelTable) {
        for &(channel, value) in &self.intensities {
            table.set_intensity(channel, value);
        }
        for &channel in &self.inverted {
            table.set_inverted(channel, true);
        }
    }

    fn apply_to_session(&self, session: &mut Session) {
        for &(channel, value) in &self.intensities {
            session.set_intensity(channel, value);
        }
        for &channel in &self.inverted {
            session.set_inverted(channel, true);
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => PackerConfig::load(path)?,
        None => PackerConfig::from_env(),
    };
    tracing::debug!(
        resolution = %config.resolution,
        analyzer = ?config.analyzer.kind,
        output_dir = %config.output_dir.display(),
        "configuration resolved"
    );

    match cli.command {
        Commands::Pack {
            folder,
            ao,
            metallic,
            roughness,
            displacement,
            normal,
            alpha,
            intensity,
            invert,
            resolution,
            output,
            json,
        } => {
            let files = [
                (TextureChannel::AmbientOcclusion, ao),
                (TextureChannel::Metallic, metallic),
                (TextureChannel::Roughness, roughness),
                (TextureChannel::Displacement, displacement),
                (TextureChannel::Normal, normal),
                (TextureChannel::Alpha, alpha),
            ];
            let settings = SlotSettings::parse(&intensity, &invert)?;
            let resolution = resolve_resolution(&config, resolution.as_deref())?;
            let output = output.unwrap_or_else(|| config.output_dir.clone());
            cmd_pack(folder.as_deref(), files, &settings, resolution, &output, json)
        }
        Commands::Generate {
            base,
            analyzer,
            metal,
            roughness,
            ao_intensity,
            displacement_contrast,
            intensity,
            invert,
            resolution,
            output,
            json,
        } => {
            let settings = SlotSettings::parse(&intensity, &invert)?;
            let overrides = ParameterOverrides {
                metal,
                roughness,
                ao_intensity,
                displacement_contrast,
            };
            let resolution = resolve_resolution(&config, resolution.as_deref())?;
            let output = output.unwrap_or_else(|| config.output_dir.clone());
            let runtime = build_runtime()?;
            runtime.block_on(cmd_generate(
                &config,
                &base,
                analyzer.as_deref(),
                &overrides,
                &settings,
                resolution,
                &output,
                json,
            ))
        }
        Commands::Analyze { base, analyzer } => {
            let runtime = build_runtime()?;
            runtime.block_on(cmd_analyze(&config, &base, analyzer.as_deref()))
        }
        Commands::Normal {
            height,
            resolution,
            output,
        } => {
            let resolution = resolve_resolution(&config, resolution.as_deref())?;
            let output = output.unwrap_or_else(|| config.output_dir.clone());
            cmd_normal(&height, resolution, &output)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_runtime() -> CliResult<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

fn resolve_resolution(config: &PackerConfig, flag: Option<&str>) -> CliResult<ExportResolution> {
    match flag {
        Some(s) => Ok(s.parse()?),
        None => Ok(config.resolution),
    }
}

fn parse_channel(name: &str) -> CliResult<TextureChannel> {
    TextureChannel::parse(name).ok_or_else(|| {
        format!(
            "Unknown channel: {}. Use ao, metallic, roughness, displacement, normal, or alpha.",
            name
        )
        .into()
    })
}

fn parse_intensity(arg: &str) -> CliResult<(TextureChannel, f32)> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("Expected CHANNEL=VALUE, got \"{}\"", arg))?;
    let channel = parse_channel(name)?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid intensity for {}: {}", channel, value))?;
    Ok((channel, value))
}

/// Analyzer from config, optionally replaced by `--analyzer`.
fn analyzer_config(config: &PackerConfig, flag: Option<&str>) -> CliResult<AnalyzerConfig> {
    let mut analyzer = config.analyzer.clone();
    if let Some(kind) = flag {
        analyzer.kind = kind.parse::<AnalyzerKind>()?;
    }
    Ok(analyzer)
}

fn load_texture(path: &Path) -> CliResult<TextureMap> {
    let img = ImageLoader::load(path)?;
    Ok(TextureMap::from_loaded(img, Some(path.to_path_buf())))
}

fn resolution_summary(resolution: ExportResolution) -> String {
    format!("{}x{} ({})", resolution, resolution, resolution.label())
}

fn print_bundle(bundle: &ExportBundle, resolution: ExportResolution, json: bool) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(bundle)?);
        return Ok(());
    }
    for skipped in &bundle.skipped {
        eprintln!("⚠ {} packed as a constant: {}", skipped.channel, skipped.reason);
    }
    for (role, path) in &bundle.written {
        println!("{:<7} {}", role.tag(), path.display());
    }
    println!("Exported {} texture(s) at {}", bundle.written.len(), resolution_summary(resolution));
    Ok(())
}

fn cmd_pack(
    folder: Option<&Path>,
    files: [(TextureChannel, Option<PathBuf>); 6],
    settings: &SlotSettings,
    resolution: ExportResolution,
    output: &Path,
    json: bool,
) -> CliResult<()> {
    let mut table = match folder {
        Some(dir) => {
            let (table, failures) = ChannelTable::load_from_folder(dir)?;
            for (path, e) in &failures {
                eprintln!("⚠ Skipping {}: {}", path.display(), e);
            }
            table
        }
        None => ChannelTable::default(),
    };

    for (channel, path) in files {
        let Some(path) = path else { continue };
        match load_texture(&path) {
            Ok(texture) => table.upload(channel, texture),
            Err(e) => {
                tracing::warn!(%channel, path = %path.display(), error = %e, "skipping unreadable channel map");
                eprintln!("⚠ Skipping {} ({}): {}", path.display(), channel, e);
                table.clear(channel);
            }
        }
    }

    if table.bound_count() == 0 {
        return Err("No channel maps given. Use --folder or --ao/--metallic/--roughness/--displacement.".into());
    }

    settings.apply_to_table(&mut table);

    let sampler = FilteredSampler::default();
    let bundle = ExportEncoder::new(&sampler).export_bundle(&table, resolution, output)?;
    print_bundle(&bundle, resolution, json)
}

/// Parameter flags of `generate`; applied on top of analysis or defaults.
#[derive(Debug, Default)]
struct ParameterOverrides {
    metal: bool,
    roughness: Option<f32>,
    ao_intensity: Option<f32>,
    displacement_contrast: Option<f32>,
}

impl ParameterOverrides {
    fn is_empty(&self) -> bool {
        !self.metal
            && self.roughness.is_none()
            && self.ao_intensity.is_none()
            && self.displacement_contrast.is_none()
    }

    fn apply(&self, mut params: PbrParameters) -> PbrParameters {
        if self.metal {
            params.is_metal = true;
        }
        if let Some(v) = self.roughness {
            params.roughness_estimate = v;
        }
        if let Some(v) = self.ao_intensity {
            params.ao_intensity = v;
        }
        if let Some(v) = self.displacement_contrast {
            params.displacement_contrast = v;
        }
        params
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_generate(
    config: &PackerConfig,
    base: &Path,
    analyzer: Option<&str>,
    overrides: &ParameterOverrides,
    settings: &SlotSettings,
    resolution: ExportResolution,
    output: &Path,
    json: bool,
) -> CliResult<()> {
    let analyzer = analyzer_config(config, analyzer)?.build()?;
    let sampler = FilteredSampler::default();

    let mut session = Session::new()
        .with_resolution(resolution)
        .with_parameters(config.parameters.clone());
    session.set_base_color(load_texture(base)?);

    let outcome = smart_generate(&mut session, analyzer.as_ref(), &config.parameters, &sampler).await?;
    if let Some(reason) = &outcome.fallback_reason {
        eprintln!("⚠ Analysis failed ({}). Using default parameters.", reason);
    }
    if !overrides.is_empty() {
        session.update_parameters(overrides.apply(session.parameters().clone()))?;
    }
    settings.apply_to_session(&mut session);

    let bundle = export_session(&session, &sampler, output)?;
    if json {
        let report = GenerateReport {
            parameters: session.parameters().clone(),
            analyzer: outcome.analyzer,
            fallback_reason: outcome.fallback_reason,
            export: bundle,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let p = session.parameters();
        println!(
            "Parameters: metal={} roughness={:.2} ao={:.2} displacement={:.2}",
            p.is_metal, p.roughness_estimate, p.ao_intensity, p.displacement_contrast
        );
        if !p.description.is_empty() {
            println!("  {}", p.description);
        }
        print_bundle(&bundle, resolution, false)?;
    }
    Ok(())
}

async fn cmd_analyze(config: &PackerConfig, base: &Path, analyzer: Option<&str>) -> CliResult<()> {
    let analyzer = analyzer_config(config, analyzer)?
        .build()?
        .ok_or("Analysis is disabled. Use --analyzer heuristic or --analyzer command.")?;
    let texture = load_texture(base)?;
    let image = AnalysisImage::prepare(&texture, &FilteredSampler::default())?;
    let parameters = analyzer.analyze(&image).await?;
    println!("{}", serde_json::to_string_pretty(&parameters)?);
    Ok(())
}

fn cmd_normal(height: &Path, resolution: ExportResolution, output: &Path) -> CliResult<()> {
    let texture = load_texture(height)?;
    let normal = NormalMapSynthesizer::default().synthesize(&LuminanceField::from_texture(&texture));

    std::fs::create_dir_all(output)?;
    let sampler = FilteredSampler::default();
    let path = ExportEncoder::new(&sampler).write(ExportRole::Normal, &normal, resolution, output)?;
    println!("Wrote {} at {}", path.display(), resolution_summary(resolution));
    Ok(())
}
