//! Offline tool that builds, inspects and previews resource containers.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Arg, ArgMatches, Command};
use image::RgbaImage;
use log::{error, info};
use rayon::prelude::*;

use sprite_blob::atlas::{opaque_bounds, AtlasPacker, DEFAULT_ATLAS_SIZE};
use sprite_blob::blit::BlitGraphics;
use sprite_blob::blob::{Blob, BlobWriter};
use sprite_blob::camera::WindowCamera;
use sprite_blob::config::RuntimeConfig;
use sprite_blob::graphics::{Graphics, Image};
use sprite_blob::loader::{AssetLoader, AssetSource};
use sprite_blob::rect::Rectangle;
use sprite_blob::sound::AudioBridge;
use sprite_blob::{Error, Result};

const COLLISION_SUFFIX: &str = ".collision.png";

/// Where `preview` draws one sprite.
#[derive(Debug, Clone)]
struct Placement {
    id: String,
    x: i32,
    y: i32,
}

fn parse_placement(s: &str) -> std::result::Result<Placement, String> {
    let (id, position) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("expected <id>@<x>,<y>, got '{}'", s))?;
    let (x, y) = position
        .split_once(',')
        .ok_or_else(|| format!("expected <x>,<y> after '@', got '{}'", position))?;
    Ok(Placement {
        id: id.to_string(),
        x: x.trim().parse().map_err(|e| format!("bad x in '{}': {}", s, e))?,
        y: y.trim().parse().map_err(|e| format!("bad y in '{}': {}", s, e))?,
    })
}

enum InputKind {
    Image,
    Collision,
    Raw,
}

struct Input {
    id: String,
    path: PathBuf,
    kind: InputKind,
}

impl Input {
    fn classify(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        if name.starts_with('.') {
            return None;
        }

        let (id, kind) = if let Some(stem) = name.strip_suffix(COLLISION_SUFFIX) {
            (format!("{} collision", stem), InputKind::Collision)
        } else if let Some(stem) = name.strip_suffix(".png") {
            (stem.to_string(), InputKind::Image)
        } else {
            let stem = path.file_stem()?.to_str()?.to_string();
            (stem, InputKind::Raw)
        };
        Some(Self { id, path, kind })
    }
}

/// Inputs of `dir` sorted by file name, so equal directories produce equal
/// containers.
fn collect_inputs(dir: &Path) -> Result<Vec<Input>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths.into_iter().filter_map(Input::classify).collect())
}

fn decode_all(inputs: &[&Input]) -> Result<Vec<(String, RgbaImage)>> {
    inputs
        .par_iter()
        .map(|input| -> Result<(String, RgbaImage)> {
            let image = image::open(&input.path)?.to_rgba8();
            Ok((input.id.clone(), image))
        })
        .collect()
}

fn build(input_dir: &Path, output: &Path, atlas_size: u32) -> Result<()> {
    let inputs = collect_inputs(input_dir)?;

    let sprites: Vec<&Input> = inputs
        .iter()
        .filter(|i| matches!(i.kind, InputKind::Image))
        .collect();
    let masks: Vec<&Input> = inputs
        .iter()
        .filter(|i| matches!(i.kind, InputKind::Collision))
        .collect();

    let images = decode_all(&sprites)?;
    let packed = AtlasPacker::new(atlas_size).pack(&images)?;

    let mut writer = BlobWriter::new();
    packed.append_to(&mut writer)?;

    for (id, mask) in decode_all(&masks)? {
        let bounds = opaque_bounds(&mask).ok_or_else(|| Error::EmptyImage(id.clone()))?;
        writer.append(id, bounds.to_le_bytes().to_vec())?;
    }

    let mut raw_count = 0;
    for input in inputs.iter().filter(|i| matches!(i.kind, InputKind::Raw)) {
        writer.append(input.id.clone(), fs::read(&input.path)?)?;
        raw_count += 1;
    }

    writer.save(output)?;
    info!(
        "Packed {} images, {} collision boxes and {} raw files into {:?}",
        images.len(),
        masks.len(),
        raw_count,
        output
    );
    Ok(())
}

fn list(path: &Path) -> Result<()> {
    let blob = Blob::open(path)?;
    for (id, payload) in blob.iter() {
        println!("{:>10}  {}", payload.len(), id);
    }
    Ok(())
}

/// Smallest frame, at least 1x1, that holds every placed sprite.
fn frame_extent(sprites: &[(Image, i32, i32)]) -> (i32, i32) {
    sprites
        .iter()
        .fold((1, 1), |(width, height), (image, x, y)| {
            let (w, h) = image.size();
            (width.max(x.saturating_add(w)), height.max(y.saturating_add(h)))
        })
}

fn preview(path: &Path, output: &Path, placements: &[Placement]) -> Result<()> {
    let blob = Blob::open(path)?;

    // size the frame later, once every sprite's extent is known
    let mut graphics = BlitGraphics::new(WindowCamera::new(0, 0));
    let (audio, _audio_commands) = AudioBridge::new();
    let mut loader = AssetLoader::from_blob(blob, &mut graphics, audio)?;

    let mut sprites = Vec::with_capacity(placements.len());
    for placement in placements {
        let image = loader.load_image(&placement.id)?;
        sprites.push((image, placement.x, placement.y));
    }

    // world view equals the frame, so placements are frame pixels
    let (width, height) = frame_extent(&sprites);
    let camera = graphics.camera_mut();
    camera.set_window_size(width, height);
    camera.set_world_position(Rectangle::new(0, 0, width, height));
    let (r, g, b) = RuntimeConfig::default().clear_color;
    graphics.clear_screen(r, g, b);
    for (image, x, y) in &sprites {
        image.draw_at(&mut graphics, *x, *y);
    }
    graphics.flush()?;
    loader.close(&mut graphics);

    graphics.into_frame().save(output)?;
    info!("Wrote {}x{} preview to {:?}", width, height, output);
    Ok(())
}

fn cli() -> Command {
    Command::new("pack")
        .about("Builds and inspects sprite_blob resource containers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("build")
                .about("Packs a directory of assets into a container")
                .arg(Arg::new("input").required(true).help("Asset directory"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .required(true)
                        .help("Container file to write"),
                )
                .arg(
                    Arg::new("size")
                        .long("size")
                        .help("Atlas width and height in pixels [default: 2048]")
                        .value_parser(clap::value_parser!(u32).range(1..)),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("Prints payload sizes and IDs")
                .arg(Arg::new("blob").required(true)),
        )
        .subcommand(
            Command::new("preview")
                .about("Renders sprites into a PNG")
                .arg(Arg::new("blob").required(true))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .required(true),
                )
                .arg(
                    Arg::new("sprites")
                        .num_args(1..)
                        .required(true)
                        .value_parser(parse_placement)
                        .help("Sprites as <id>@<x>,<y>"),
                ),
        )
}

fn path_arg(matches: &ArgMatches, name: &str) -> PathBuf {
    matches
        .get_one::<String>(name)
        .map(PathBuf::from)
        .unwrap_or_default()
}

fn run(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("build", sub)) => {
            let size = sub
                .get_one::<u32>("size")
                .copied()
                .unwrap_or(DEFAULT_ATLAS_SIZE);
            build(&path_arg(sub, "input"), &path_arg(sub, "output"), size)
        }
        Some(("list", sub)) => list(&path_arg(sub, "blob")),
        Some(("preview", sub)) => {
            let placements: Vec<Placement> = sub
                .get_many::<Placement>("sprites")
                .map(|p| p.cloned().collect())
                .unwrap_or_default();
            preview(&path_arg(sub, "blob"), &path_arg(sub, "output"), &placements)
        }
        _ => Ok(()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    if let Err(err) = run(&matches) {
        error!("{}", err);
        std::process::exit(1);
    }
}
