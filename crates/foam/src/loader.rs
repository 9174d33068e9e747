//! Snapshot loading: legacy-VTK point clouds into the bucket grid.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use glam::DVec3;

use crate::error::{FoamError, Result};
use crate::grid::{Aabb, BucketGrid};

/// Load one fluid snapshot into a freshly built bucket grid.
///
/// Returns `Ok(None)` when the file does not exist; the driver treats that
/// as the end of the input sequence, not as an error. Any other I/O or
/// parse failure is fatal.
pub fn load_snapshot(
    path: &Path,
    bounds: Aabb,
    h: f64,
    exclusion: Option<Aabb>,
) -> Result<Option<BucketGrid>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(FoamError::Io {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };

    let cloud = parse_polydata(&bytes).map_err(|reason| FoamError::MalformedInput {
        path: path.to_path_buf(),
        reason,
    })?;

    let mut grid = BucketGrid::new(bounds, h);
    if let Some(zone) = exclusion {
        grid.set_exclusion_zone(zone);
    }
    for i in 0..cloud.positions.len() {
        grid.insert(cloud.positions[i], cloud.velocities[i], cloud.densities[i]);
    }
    Ok(Some(grid))
}

/// Parse the exclusion-zone descriptor: six whitespace-separated numbers,
/// `minx miny minz maxx maxy maxz`.
pub fn load_exclusion_zone(path: &Path) -> Result<Aabb> {
    let text = fs::read_to_string(path).map_err(|err| FoamError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    let values: Vec<f64> = text
        .split_whitespace()
        .map(|tok| tok.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|err| FoamError::MalformedInput {
            path: path.to_path_buf(),
            reason: format!("non-numeric token in exclusion zone: {err}"),
        })?;
    if values.len() != 6 {
        return Err(FoamError::MalformedInput {
            path: path.to_path_buf(),
            reason: format!("expected 6 numbers, found {}", values.len()),
        });
    }
    Ok(Aabb::new(
        DVec3::new(values[0], values[1], values[2]),
        DVec3::new(values[3], values[4], values[5]),
    ))
}

/// A parsed snapshot: positions plus the velocity and rest-density
/// attributes the engine requires.
#[derive(Debug)]
struct PointCloud {
    positions: Vec<DVec3>,
    velocities: Vec<DVec3>,
    densities: Vec<f64>,
}

#[derive(Clone, Copy, PartialEq)]
enum Encoding {
    Ascii,
    Binary,
}

#[derive(Clone, Copy)]
enum Scalar {
    F32,
    F64,
    I32,
}

impl Scalar {
    fn from_name(name: &str) -> std::result::Result<Self, String> {
        match name {
            "float" => Ok(Scalar::F32),
            "double" => Ok(Scalar::F64),
            "int" => Ok(Scalar::I32),
            other => Err(format!("unsupported data type {other:?}")),
        }
    }

    fn width(self) -> usize {
        match self {
            Scalar::F32 | Scalar::I32 => 4,
            Scalar::F64 => 8,
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Next text line, without the terminator. `None` at end of input.
    fn line(&mut self) -> Option<String> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[self.pos..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        self.pos += end + 1;
        Some(String::from_utf8_lossy(&rest[..end]).trim_end().to_string())
    }

    /// Next non-empty line.
    fn content_line(&mut self) -> Option<String> {
        while let Some(line) = self.line() {
            if !line.trim().is_empty() {
                return Some(line);
            }
        }
        None
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], String> {
        if self.pos + n > self.bytes.len() {
            return Err(format!("truncated file: wanted {n} more bytes"));
        }
        let chunk = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(chunk)
    }

    /// Read `count` numeric values in the given encoding. Binary data is
    /// big-endian, as the legacy VTK format requires.
    fn values(
        &mut self,
        encoding: Encoding,
        scalar: Scalar,
        count: usize,
    ) -> std::result::Result<Vec<f64>, String> {
        match encoding {
            Encoding::Binary => {
                let raw = self.take(count * scalar.width())?;
                let mut out = Vec::with_capacity(count);
                match scalar {
                    Scalar::F32 => {
                        for chunk in raw.chunks_exact(4) {
                            out.push(f32::from_be_bytes(chunk.try_into().unwrap()) as f64);
                        }
                    }
                    Scalar::F64 => {
                        for chunk in raw.chunks_exact(8) {
                            out.push(f64::from_be_bytes(chunk.try_into().unwrap()));
                        }
                    }
                    Scalar::I32 => {
                        for chunk in raw.chunks_exact(4) {
                            out.push(i32::from_be_bytes(chunk.try_into().unwrap()) as f64);
                        }
                    }
                }
                Ok(out)
            }
            Encoding::Ascii => {
                let mut out = Vec::with_capacity(count);
                while out.len() < count {
                    let line = self
                        .line()
                        .ok_or_else(|| format!("truncated file: wanted {count} values"))?;
                    for tok in line.split_whitespace() {
                        out.push(
                            tok.parse::<f64>()
                                .map_err(|_| format!("non-numeric token {tok:?}"))?,
                        );
                        if out.len() == count {
                            break;
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// Skip a connectivity block of `count` ints.
    fn skip_ints(&mut self, encoding: Encoding, count: usize) -> std::result::Result<(), String> {
        match encoding {
            Encoding::Binary => self.take(count * 4).map(|_| ()),
            Encoding::Ascii => self.values(encoding, Scalar::I32, count).map(|_| ()),
        }
    }
}

/// Parse a legacy VTK polydata point cloud, ASCII or binary.
fn parse_polydata(bytes: &[u8]) -> std::result::Result<PointCloud, String> {
    let mut reader = Reader::new(bytes);

    let magic = reader.line().ok_or("empty file")?;
    if !magic.starts_with("# vtk DataFile") {
        return Err(format!("not a legacy VTK file: {magic:?}"));
    }
    reader.line().ok_or("missing title line")?;
    let encoding = match reader.content_line().as_deref() {
        Some("ASCII") => Encoding::Ascii,
        Some("BINARY") => Encoding::Binary,
        other => return Err(format!("unsupported encoding {other:?}")),
    };
    match reader.content_line().as_deref() {
        Some(line) if line.starts_with("DATASET POLYDATA") => {}
        other => return Err(format!("expected DATASET POLYDATA, found {other:?}")),
    }

    let mut positions: Vec<DVec3> = Vec::new();
    // (name, components, values)
    let mut arrays: Vec<(String, usize, Vec<f64>)> = Vec::new();

    while let Some(line) = reader.content_line() {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or("");
        match keyword {
            "POINTS" => {
                let n: usize = parse_word(words.next(), "POINTS count")?;
                let scalar = Scalar::from_name(words.next().unwrap_or(""))?;
                let flat = reader.values(encoding, scalar, n * 3)?;
                positions = flat
                    .chunks_exact(3)
                    .map(|c| DVec3::new(c[0], c[1], c[2]))
                    .collect();
            }
            "VERTICES" | "LINES" | "POLYGONS" | "TRIANGLE_STRIPS" => {
                let _cells: usize = parse_word(words.next(), "cell count")?;
                let size: usize = parse_word(words.next(), "cell list size")?;
                reader.skip_ints(encoding, size)?;
            }
            "POINT_DATA" => {
                let n: usize = parse_word(words.next(), "POINT_DATA count")?;
                if n != positions.len() {
                    return Err(format!(
                        "POINT_DATA count {n} does not match {} points",
                        positions.len()
                    ));
                }
            }
            "SCALARS" => {
                let name = parse_name(words.next(), "SCALARS name")?;
                let scalar = Scalar::from_name(words.next().unwrap_or(""))?;
                let ncomp: usize = match words.next() {
                    Some(word) => parse_word(Some(word), "SCALARS components")?,
                    None => 1,
                };
                match reader.content_line() {
                    Some(line) if line.starts_with("LOOKUP_TABLE") => {}
                    other => return Err(format!("expected LOOKUP_TABLE, found {other:?}")),
                }
                let values = reader.values(encoding, scalar, positions.len() * ncomp)?;
                arrays.push((name, ncomp, values));
            }
            "VECTORS" | "NORMALS" => {
                let name = parse_name(words.next(), "VECTORS name")?;
                let scalar = Scalar::from_name(words.next().unwrap_or(""))?;
                let values = reader.values(encoding, scalar, positions.len() * 3)?;
                arrays.push((name, 3, values));
            }
            "FIELD" => {
                let _name = words.next();
                let count: usize = parse_word(words.next(), "FIELD array count")?;
                for _ in 0..count {
                    let header = reader
                        .content_line()
                        .ok_or("truncated FIELD block")?;
                    let mut parts = header.split_whitespace();
                    let name = parse_name(parts.next(), "field array name")?;
                    let ncomp: usize = parse_word(parts.next(), "field components")?;
                    let ntuples: usize = parse_word(parts.next(), "field tuples")?;
                    let scalar = Scalar::from_name(parts.next().unwrap_or(""))?;
                    let values = reader.values(encoding, scalar, ncomp * ntuples)?;
                    arrays.push((name, ncomp, values));
                }
            }
            // Cell attributes carry nothing the engine needs.
            "CELL_DATA" => break,
            other => return Err(format!("unsupported section {other:?}")),
        }
    }

    if positions.is_empty() {
        // A zero-particle frame is legal; attributes may be absent too.
        return Ok(PointCloud {
            positions,
            velocities: Vec::new(),
            densities: Vec::new(),
        });
    }

    let velocities = find_array(&arrays, 3, &["vel", "velocity"])
        .ok_or("no velocity attribute (Vel / Velocity)")?;
    let densities = find_array(&arrays, 1, &["rhop", "density", "rho"])
        .ok_or("no rest-density attribute (Rhop / Density)")?;
    if velocities.len() != positions.len() * 3 || densities.len() != positions.len() {
        return Err("attribute length does not match point count".to_string());
    }

    Ok(PointCloud {
        velocities: velocities
            .chunks_exact(3)
            .map(|c| DVec3::new(c[0], c[1], c[2]))
            .collect(),
        densities: densities.to_vec(),
        positions,
    })
}

fn parse_word<T: std::str::FromStr>(
    word: Option<&str>,
    what: &str,
) -> std::result::Result<T, String> {
    word.ok_or_else(|| format!("missing {what}"))?
        .parse::<T>()
        .map_err(|_| format!("invalid {what}"))
}

fn parse_name(word: Option<&str>, what: &str) -> std::result::Result<String, String> {
    word.map(str::to_string).ok_or_else(|| format!("missing {what}"))
}

fn find_array<'a>(
    arrays: &'a [(String, usize, Vec<f64>)],
    ncomp: usize,
    names: &[&str],
) -> Option<&'a Vec<f64>> {
    arrays
        .iter()
        .find(|(name, comps, _)| *comps == ncomp && names.contains(&name.to_lowercase().as_str()))
        .map(|(_, _, values)| values)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII_SNAPSHOT: &str = "\
# vtk DataFile Version 3.0
fluid frame
ASCII
DATASET POLYDATA
POINTS 2 float
0.1 0.2 0.3
0.4 0.5 0.6
VERTICES 2 4
1 0
1 1
POINT_DATA 2
VECTORS Vel float
1 0 0
0 2 0
SCALARS Rhop float 1
LOOKUP_TABLE default
1000 1001
";

    #[test]
    fn test_parse_ascii_polydata() {
        let cloud = parse_polydata(ASCII_SNAPSHOT.as_bytes()).unwrap();
        assert_eq!(cloud.positions.len(), 2);
        assert!((cloud.positions[1] - DVec3::new(0.4, 0.5, 0.6)).length() < 1e-6);
        assert_eq!(cloud.velocities[0], DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(cloud.densities[1], 1001.0);
    }

    #[test]
    fn test_parse_binary_points() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"# vtk DataFile Version 3.0\nframe\nBINARY\nDATASET POLYDATA\n");
        bytes.extend_from_slice(b"POINTS 1 double\n");
        for v in [1.0f64, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(b"\nPOINT_DATA 1\nVECTORS Velocity double\n");
        for v in [4.0f64, 5.0, 6.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(b"\nSCALARS Density double 1\nLOOKUP_TABLE default\n");
        bytes.extend_from_slice(&1000.0f64.to_be_bytes());
        bytes.push(b'\n');

        let cloud = parse_polydata(&bytes).unwrap();
        assert_eq!(cloud.positions[0], DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(cloud.velocities[0], DVec3::new(4.0, 5.0, 6.0));
        assert_eq!(cloud.densities[0], 1000.0);
    }

    #[test]
    fn test_missing_velocity_rejected() {
        let text = "\
# vtk DataFile Version 3.0
frame
ASCII
DATASET POLYDATA
POINTS 1 float
0 0 0
POINT_DATA 1
SCALARS Rhop float 1
LOOKUP_TABLE default
1000
";
        let err = parse_polydata(text.as_bytes()).unwrap_err();
        assert!(err.contains("velocity"));
    }

    #[test]
    fn test_empty_frame_parses() {
        let text = "\
# vtk DataFile Version 3.0
frame
ASCII
DATASET POLYDATA
POINTS 0 float
";
        let cloud = parse_polydata(text.as_bytes()).unwrap();
        assert!(cloud.positions.is_empty());
    }

    #[test]
    fn test_non_vtk_rejected() {
        assert!(parse_polydata(b"hello\nworld\n").is_err());
    }
}
