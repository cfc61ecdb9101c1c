// ABOUTME: Main entry point for the lecture-deck program.
// ABOUTME: Provides CLI interface and executes commands from the library.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use lecture_deck::config::parse_break_depths;
use lecture_deck::loader::load_document;
use lecture_deck::{Asset, Config, ParseOptions, Segmenter, ViewMode};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a markdown document as a standalone HTML page
    Render(RenderArgs),

    /// Print the slide units of a markdown document
    Segment(SegmentArgs),

    /// Print the table of contents of a markdown document
    Toc(TocArgs),

    /// Serve a document or course directory with live reload
    Serve(ServeArgs),
}

#[derive(Args)]
struct SegmentationArgs {
    /// Heading depths that start a new slide, comma separated
    #[arg(long)]
    break_depths: Option<String>,

    /// Id for a leading slide without a heading
    #[arg(long)]
    intro_label: Option<String>,
}

#[derive(Args)]
struct RenderArgs {
    /// Path to the markdown file
    #[arg(short, long)]
    input: PathBuf,

    /// Path to output HTML file
    #[arg(short, long)]
    output: PathBuf,

    /// View mode to render: 'linear' or 'paginated'
    #[arg(long, default_value = "linear")]
    view: String,

    /// CSS files to include (local paths or URLs)
    #[arg(long, value_delimiter = ',')]
    css: Option<Vec<String>>,

    /// JavaScript files to include (local paths or URLs)
    #[arg(long, value_delimiter = ',')]
    js: Option<Vec<String>>,

    /// Mode for CSS/JS: 'embed' to embed content or 'link' to reference
    #[arg(long, default_value = "embed")]
    mode: String,

    #[command(flatten)]
    segmentation: SegmentationArgs,
}

#[derive(Args)]
struct SegmentArgs {
    /// Path to the markdown file
    #[arg(short, long)]
    input: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    segmentation: SegmentationArgs,
}

#[derive(Args)]
struct TocArgs {
    /// Path to the markdown file
    #[arg(short, long)]
    input: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ServeArgs {
    /// Markdown file or course directory
    root: PathBuf,

    /// HTTP port; sessions use the next port
    #[arg(short, long)]
    port: Option<u16>,

    /// File persisting the view mode between runs
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// CSS files to include (local paths or URLs)
    #[arg(long, value_delimiter = ',')]
    css: Option<Vec<String>>,

    /// JavaScript files to include (local paths or URLs)
    #[arg(long, value_delimiter = ',')]
    js: Option<Vec<String>>,
}

fn segmenter(config: &Config, args: &SegmentationArgs) -> Segmenter {
    let depths = args.break_depths.as_deref().map(parse_break_depths);
    Segmenter::new(config.get_segment_config(depths, args.intro_label.clone()))
}

fn load(
    path: &Path,
    segmenter: &Segmenter,
) -> anyhow::Result<lecture_deck::RenderedDocument> {
    let key = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    load_document(path, &key, segmenter, &ParseOptions::default())
        .with_context(|| format!("Failed to load {:?}", path))
}

fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Render(args)) => {
            let view: ViewMode = args.view.parse()?;
            let embed = match args.mode.as_str() {
                "embed" => true,
                "link" => false,
                other => anyhow::bail!("Unknown resource mode: {} (expected embed or link)", other),
            };
            let css: Vec<Asset> = args
                .css
                .unwrap_or_default()
                .iter()
                .map(|p| Asset::css(p))
                .collect();
            let js: Vec<Asset> = args
                .js
                .unwrap_or_default()
                .iter()
                .map(|p| Asset::js(p))
                .collect();
            let segment_config = segmenter(config, &args.segmentation).config().clone();

            let html = lecture_deck::html::generate_html_with_config(
                &args.input,
                &css,
                &js,
                embed,
                view,
                &segment_config,
            )?;
            lecture_deck::write_html_to_file(&html, &args.output)?;
            println!("HTML generated successfully: {:?}", args.output);
            Ok(())
        }
        Some(Commands::Segment(args)) => {
            let doc = load(&args.input, &segmenter(config, &args.segmentation))?;
            if args.json {
                let units: Vec<_> = doc
                    .units
                    .iter()
                    .map(|u| {
                        json!({
                            "id": u.id,
                            "layout": u.layout,
                            "title": u.title(),
                            "nodes": u.nodes.len(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&units)?);
            } else {
                for unit in &doc.units {
                    println!("{}\t{}\t{}", unit.id, unit.layout, unit.nodes.len());
                }
            }
            Ok(())
        }
        Some(Commands::Toc(args)) => {
            let doc = load(&args.input, &Segmenter::new(config.get_segment_config(None, None)))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&doc.headings)?);
            } else {
                for heading in &doc.headings {
                    println!("{}\t{}", heading.id, heading.text);
                }
            }
            Ok(())
        }
        Some(Commands::Serve(args)) => {
            let serve_config = config.get_serve_config(
                args.root,
                args.port,
                args.state_file,
                args.css.unwrap_or_default(),
                args.js.unwrap_or_default(),
            );
            lecture_deck::serve(serve_config, config)?;
            Ok(())
        }
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::from_env();

    if let Err(e) = run(cli, &config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
