//! Readers and writers for 3D mesh scene files.
//!
//! Every format loads into, and saves from, the shared
//! [`SceneFile`](scenefile_core::SceneFile) model from `scenefile-core`.
//!
//! # Supported Formats
//!
//! | Format | Read | Write | Notes                                |
//! |--------|------|-------|--------------------------------------|
//! | OBJ    | ✓    | ✓     | with sidecar MTL material library    |
//! | JTF    | ✓    | ✓     | flat binary triangle dump            |
//! | STL    | ✓    | ✓     | binary only                          |
//! | 3DS    | ✓    | ✓     | tagged-chunk binary tree             |
//! | glTF   | ✓    | ✓     | `.gltf` and `.glb`, no Draco         |
//!
//! # Loading
//!
//! Loading never needs the format spelled out: codecs are tried in a
//! fixed priority order, rewinding the stream between attempts. OBJ goes
//! last because it has no magic to check.
//!
//! ```ignore
//! let scene = scenefile_io::load_path("model.glb")?;
//! for mesh in scene.meshes() {
//!     println!("{}: {} triangles", mesh.name, mesh.num_faces());
//! }
//! ```
//!
//! # Saving
//!
//! The target format comes from an explicit [`Format`], else from the
//! file suffix, else OBJ:
//!
//! ```ignore
//! scenefile_io::save_path(&scene, "out.stl")?;
//! scenefile_io::save_path_with(&scene, "weird.bin", Some(Format::Jtf))?;
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use scenefile_core::{PostProcess, SceneFile};

pub mod error;

mod b64;
mod gltf;
mod json_path;
mod jtf;
mod leio;
mod obj;
mod stl;
mod tds;

pub use error::{Error, Result};

/// The file formats this crate can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Tds,
    Jtf,
    Gltf,
    Stl,
    Obj,
}

impl Format {
    /// Trial order for format detection. OBJ must come last: it has no
    /// magic and serves as the fallback.
    pub const TRIAL_ORDER: [Format; 5] = [
        Format::Tds,
        Format::Jtf,
        Format::Gltf,
        Format::Stl,
        Format::Obj,
    ];

    /// Guess the format from a filename suffix.
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "3ds" => Some(Format::Tds),
            "jtf" => Some(Format::Jtf),
            "gltf" | "glb" => Some(Format::Gltf),
            "stl" => Some(Format::Stl),
            "obj" => Some(Format::Obj),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Tds => "3ds",
            Format::Jtf => "jtf",
            Format::Gltf => "gltf",
            Format::Stl => "stl",
            Format::Obj => "obj",
        }
    }
}

/// Load a scene from a file, detecting the format by trial, with default
/// post-processing (synthesize missing normals).
pub fn load_path<P: AsRef<Path>>(path: P) -> Result<SceneFile> {
    load_path_with(path, PostProcess::default())
}

/// Load a scene from a file with explicit post-processing selection.
pub fn load_path_with<P: AsRef<Path>>(path: P, post: PostProcess) -> Result<SceneFile> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut scene = SceneFile::with_source(path);
    load_into(&mut scene, &mut reader, post)?;
    Ok(scene)
}

/// Load a scene from an open stream. Sidecar assets (OBJ's `mtllib`,
/// glTF's external buffers) resolve against the working directory only,
/// since no source path is known.
pub fn load<R: Read + Seek>(reader: &mut R) -> Result<SceneFile> {
    load_with(reader, PostProcess::default())
}

/// [`load`] with explicit post-processing selection.
pub fn load_with<R: Read + Seek>(reader: &mut R, post: PostProcess) -> Result<SceneFile> {
    let mut scene = SceneFile::new();
    load_into(&mut scene, reader, post)?;
    Ok(scene)
}

fn load_into<R: Read + Seek>(scene: &mut SceneFile, r: &mut R, post: PostProcess) -> Result<()> {
    let start = r.stream_position()?;
    for format in Format::TRIAL_ORDER {
        r.seek(SeekFrom::Start(start))?;
        let res = match format {
            Format::Tds => tds::load(scene, r),
            Format::Jtf => jtf::load(scene, r),
            Format::Gltf => gltf::load(scene, r),
            Format::Stl => stl::load(scene, r),
            Format::Obj => obj::load(scene, r),
        };
        match res {
            Ok(()) => {
                scene.postprocess(post);
                return Ok(());
            }
            // The stream is rewound between attempts, but entities a
            // failing codec already registered stay in the scene.
            Err(err) => debug!("{} loader: {}", format.name(), err),
        }
    }
    Err(Error::Format("no known format matched".into()))
}

/// Save a scene to a file, picking the format from the suffix (OBJ when
/// the suffix is unknown).
pub fn save_path<P: AsRef<Path>>(scene: &SceneFile, path: P) -> Result<()> {
    save_path_with(scene, path, None)
}

/// Save a scene to a file in an explicitly chosen format.
pub fn save_path_with<P: AsRef<Path>>(
    scene: &SceneFile,
    path: P,
    format: Option<Format>,
) -> Result<()> {
    let path = path.as_ref();
    let format = format
        .or_else(|| Format::from_path(path))
        .unwrap_or(Format::Obj);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    // OBJ gets the output path so it can emit its MTL sidecar.
    save_format(scene, &mut writer, format, Some(path))?;
    writer.flush()?;
    Ok(())
}

/// Save a scene to an open stream. OBJ cannot open a sidecar here, so
/// material libraries are skipped with a warning.
pub fn save<W: Write>(scene: &SceneFile, writer: &mut W, format: Format) -> Result<()> {
    save_format(scene, writer, format, None)
}

fn save_format<W: Write>(
    scene: &SceneFile,
    writer: &mut W,
    format: Format,
    obj_path: Option<&Path>,
) -> Result<()> {
    match format {
        Format::Tds => tds::save(scene, writer),
        Format::Jtf => jtf::save(scene, writer),
        Format::Gltf => gltf::save(scene, writer),
        Format::Stl => stl::save(scene, writer),
        Format::Obj => obj::save(scene, writer, obj_path),
    }
}
