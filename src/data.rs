//! Reader for LAMMPS-style data files used as initial configurations.
//!
//! Supported layout (atomic style):
//!
//! ```text
//! <title line>
//!
//! 1024 atoms
//! 5 atom types
//!
//! 0.0 198.0 xlo xhi
//! 0.0 198.0 ylo yhi
//! 0.0 198.0 zlo zhi
//!
//! Masses
//!
//! 1 50.9415
//! ...
//!
//! Atoms # atomic
//!
//! 1 3 12.5 4.0 101.25
//! ...
//!
//! Velocities
//!
//! 1 0.01 -0.2 0.0
//! ```
//!
//! Anything after `#` on a line is ignored. The `Velocities` section is
//! optional. Coordinates outside a periodic box are wrapped back inside.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read data file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed data file: {details} (at line {line})")]
    Parse { line: usize, details: String },

    #[error("inconsistent data file: {0}")]
    Inconsistent(String),
}

impl DataError {
    fn parse(line: usize, details: impl Into<String>) -> Self {
        Self::Parse {
            line,
            details: details.into(),
        }
    }

    fn inconsistent(details: impl Into<String>) -> Self {
        Self::Inconsistent(details.into())
    }
}

/// One particle as declared in the `Atoms` section.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    pub id: u64,
    /// 1-based atom type.
    pub kind: usize,
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitialConfig {
    pub atoms: Vec<AtomRecord>,
    /// Velocities in the same order as `atoms`, when the file provides them.
    pub velocities: Option<Vec<[f64; 3]>>,
    /// Mass of each type; index 0 is type 1.
    pub masses: Vec<f64>,
    /// `[lo, hi]` per axis.
    pub bounds: [[f64; 2]; 3],
}

impl InitialConfig {
    pub fn read(path: &Path) -> Result<InitialConfig, DataError> {
        let text = fs::read_to_string(path)?;
        InitialConfig::parse(&text)
    }

    pub fn type_count(&self) -> usize {
        self.masses.len()
    }

    pub fn lengths(&self) -> [f64; 3] {
        let b = &self.bounds;
        [b[0][1] - b[0][0], b[1][1] - b[1][0], b[2][1] - b[2][0]]
    }

    pub fn parse(text: &str) -> Result<InitialConfig, DataError> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .skip(1)
            .map(|(i, line)| (i + 1, strip_comment(line)))
            .filter(|(_, line)| !line.is_empty())
            .collect();

        let mut natoms: Option<usize> = None;
        let mut ntypes: Option<usize> = None;
        let mut bounds: [Option<[f64; 2]>; 3] = [None, None, None];

        let mut cursor = 0;

        // header: everything up to the first section keyword
        while cursor < lines.len() {
            let (lineno, line) = lines[cursor];
            if section_name(line).is_some() {
                break;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                [n, "atoms"] => natoms = Some(parse_count(lineno, n)?),
                [n, "atom", "types"] => ntypes = Some(parse_count(lineno, n)?),
                [lo, hi, label, hi_label] if label.len() == 3 && label.ends_with("lo") => {
                    let axis = match label.chars().next() {
                        Some('x') => 0,
                        Some('y') => 1,
                        Some('z') => 2,
                        _ => return Err(DataError::parse(lineno, format!("unknown bound '{}'", label))),
                    };
                    let expected = format!("{}hi", &label[..1]);
                    if *hi_label != expected {
                        return Err(DataError::parse(
                            lineno,
                            format!("'{}' must be followed by '{}', got '{}'", label, expected, hi_label),
                        ));
                    }
                    let lo = parse_float(lineno, lo)?;
                    let hi = parse_float(lineno, hi)?;
                    if hi <= lo {
                        return Err(DataError::parse(
                            lineno,
                            format!("{} must be greater than {}", words[3], label),
                        ));
                    }
                    bounds[axis] = Some([lo, hi]);
                }
                // other header keywords (bonds, tilt factors, ...) do not apply to atomic style
                _ => {}
            }
            cursor += 1;
        }

        let natoms = natoms.ok_or_else(|| DataError::inconsistent("missing 'atoms' count"))?;
        let ntypes = ntypes.ok_or_else(|| DataError::inconsistent("missing 'atom types' count"))?;
        if ntypes == 0 {
            return Err(DataError::inconsistent("at least one atom type is required"));
        }
        let mut box_bounds = [[0.0; 2]; 3];
        for (axis, bound) in bounds.iter().enumerate() {
            box_bounds[axis] = bound.ok_or_else(|| {
                DataError::inconsistent(format!("missing box bounds for axis {}", axis))
            })?;
        }

        let mut masses: Vec<Option<f64>> = vec![None; ntypes];
        let mut atoms: Vec<AtomRecord> = Vec::with_capacity(natoms);
        let mut raw_velocities: Vec<(usize, u64, [f64; 3])> = Vec::new();
        let mut seen_atoms = false;

        while cursor < lines.len() {
            let (lineno, line) = lines[cursor];
            let section = section_name(line)
                .ok_or_else(|| DataError::parse(lineno, format!("unexpected line '{}'", line)))?;
            cursor += 1;

            let mut body = Vec::new();
            while cursor < lines.len() && section_name(lines[cursor].1).is_none() {
                body.push(lines[cursor]);
                cursor += 1;
            }

            match section {
                Section::Masses => {
                    for (lineno, line) in body {
                        let words: Vec<&str> = line.split_whitespace().collect();
                        if words.len() < 2 {
                            return Err(DataError::parse(lineno, "expected 'type mass'"));
                        }
                        let kind = parse_type(lineno, words[0], ntypes)?;
                        let mass = parse_float(lineno, words[1])?;
                        if mass <= 0.0 {
                            return Err(DataError::parse(lineno, "mass must be positive"));
                        }
                        if masses[kind - 1].replace(mass).is_some() {
                            return Err(DataError::parse(
                                lineno,
                                format!("duplicate mass for atom type {}", kind),
                            ));
                        }
                    }
                }
                Section::Atoms => {
                    seen_atoms = true;
                    for (lineno, line) in body {
                        let words: Vec<&str> = line.split_whitespace().collect();
                        // optional trailing image flags are accepted and ignored
                        if words.len() != 5 && words.len() != 8 {
                            return Err(DataError::parse(lineno, "expected 'id type x y z'"));
                        }
                        let id = parse_id(lineno, words[0])?;
                        let kind = parse_type(lineno, words[1], ntypes)?;
                        let mut position = [0.0; 3];
                        for axis in 0..3 {
                            let value = parse_float(lineno, words[2 + axis])?;
                            position[axis] = wrap(value, box_bounds[axis]).ok_or_else(|| {
                                DataError::parse(
                                    lineno,
                                    format!(
                                        "coordinate {} lies more than one box length outside {} {}",
                                        value, box_bounds[axis][0], box_bounds[axis][1]
                                    ),
                                )
                            })?;
                        }
                        atoms.push(AtomRecord { id, kind, position });
                    }
                }
                Section::Velocities => {
                    for (lineno, line) in body {
                        let words: Vec<&str> = line.split_whitespace().collect();
                        if words.len() != 4 {
                            return Err(DataError::parse(lineno, "expected 'id vx vy vz'"));
                        }
                        let id = parse_id(lineno, words[0])?;
                        let mut v = [0.0; 3];
                        for axis in 0..3 {
                            v[axis] = parse_float(lineno, words[1 + axis])?;
                        }
                        raw_velocities.push((lineno, id, v));
                    }
                }
            }
        }

        if !seen_atoms {
            return Err(DataError::inconsistent("missing 'Atoms' section"));
        }
        if atoms.len() != natoms {
            return Err(DataError::inconsistent(format!(
                "header declares {} atoms but the Atoms section lists {}",
                natoms,
                atoms.len()
            )));
        }

        let mut index_of: HashMap<u64, usize> = HashMap::with_capacity(natoms);
        for (index, atom) in atoms.iter().enumerate() {
            if index_of.insert(atom.id, index).is_some() {
                return Err(DataError::inconsistent(format!("duplicate atom id {}", atom.id)));
            }
        }

        let masses = masses
            .into_iter()
            .enumerate()
            .map(|(i, m)| m.ok_or_else(|| DataError::inconsistent(format!("no mass for atom type {}", i + 1))))
            .collect::<Result<Vec<f64>, DataError>>()?;

        let velocities = if raw_velocities.is_empty() {
            None
        } else {
            if raw_velocities.len() != natoms {
                return Err(DataError::inconsistent(format!(
                    "Velocities section lists {} entries for {} atoms",
                    raw_velocities.len(),
                    natoms
                )));
            }
            let mut velocities = vec![[0.0; 3]; natoms];
            let mut assigned = vec![false; natoms];
            for (lineno, id, v) in raw_velocities {
                let index = *index_of
                    .get(&id)
                    .ok_or_else(|| DataError::parse(lineno, format!("velocity for unknown atom {}", id)))?;
                if assigned[index] {
                    return Err(DataError::parse(lineno, format!("second velocity for atom {}", id)));
                }
                assigned[index] = true;
                velocities[index] = v;
            }
            Some(velocities)
        };

        Ok(InitialConfig {
            atoms,
            velocities,
            masses,
            bounds: box_bounds,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Masses,
    Atoms,
    Velocities,
}

fn section_name(line: &str) -> Option<Section> {
    match line.split_whitespace().next() {
        Some("Masses") => Some(Section::Masses),
        Some("Atoms") => Some(Section::Atoms),
        Some("Velocities") => Some(Section::Velocities),
        _ => None,
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

fn parse_count(line: usize, word: &str) -> Result<usize, DataError> {
    word.parse::<usize>()
        .map_err(|_| DataError::parse(line, format!("invalid count '{}'", word)))
}

fn parse_id(line: usize, word: &str) -> Result<u64, DataError> {
    match word.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(DataError::parse(line, format!("invalid atom id '{}'", word))),
    }
}

fn parse_type(line: usize, word: &str, ntypes: usize) -> Result<usize, DataError> {
    match word.parse::<usize>() {
        Ok(kind) if kind >= 1 && kind <= ntypes => Ok(kind),
        _ => Err(DataError::parse(
            line,
            format!("atom type '{}' outside 1..={}", word, ntypes),
        )),
    }
}

fn parse_float(line: usize, word: &str) -> Result<f64, DataError> {
    match word.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(DataError::parse(line, format!("invalid number '{}'", word))),
    }
}

// periodic remap into [lo, hi); None when more than one image away
fn wrap(value: f64, bound: [f64; 2]) -> Option<f64> {
    let [lo, hi] = bound;
    let length = hi - lo;
    if value < lo - length || value >= hi + length {
        return None;
    }
    let x = lo + (value - lo).rem_euclid(length);
    // rem_euclid can round up to exactly `length`
    Some(if x >= hi { lo } else { x })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "LAMMPS data file generated by automated_pipeline.py

3 atoms
2 atom types

0.000000 10.000000 xlo xhi
0.000000 10.000000 ylo yhi
0.000000 12.000000 zlo zhi

Masses

1 50.9415
2 92.90638

Atoms # atomic

1 1 1.0 2.0 3.0
2 2 4.0 5.0 6.0
3 1 10.0 -1.0 11.5
";

    #[test]
    fn parses_generated_data_file() {
        let config = InitialConfig::parse(SAMPLE).expect("parse sample");
        assert_eq!(config.atoms.len(), 3);
        assert_eq!(config.type_count(), 2);
        assert_eq!(config.masses, vec![50.9415, 92.90638]);
        assert_eq!(config.lengths(), [10.0, 10.0, 12.0]);
        assert_eq!(config.atoms[1].kind, 2);
        assert_eq!(config.atoms[1].position, [4.0, 5.0, 6.0]);
        assert!(config.velocities.is_none());
    }

    #[test]
    fn coordinates_on_or_beyond_the_upper_bound_wrap() {
        let config = InitialConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.atoms[2].position, [0.0, 9.0, 11.5]);
    }

    #[test]
    fn atom_count_must_match_header() {
        let text = SAMPLE.replace("3 atoms", "4 atoms");
        let err = InitialConfig::parse(&text).unwrap_err();
        assert!(matches!(err, DataError::Inconsistent(_)));
        assert!(err.to_string().contains("declares 4 atoms"));
    }

    #[test]
    fn undeclared_atom_type_reports_line() {
        let text = SAMPLE.replace("2 2 4.0 5.0 6.0", "2 7 4.0 5.0 6.0");
        match InitialConfig::parse(&text).unwrap_err() {
            DataError::Parse { line, details } => {
                assert_eq!(line, 18);
                assert!(details.contains("'7'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_mass_is_inconsistent() {
        let text = SAMPLE.replace("2 92.90638\n", "");
        let err = InitialConfig::parse(&text).unwrap_err();
        assert_eq!(err.to_string(), "inconsistent data file: no mass for atom type 2");
    }

    #[test]
    fn inverted_box_is_rejected() {
        let text = SAMPLE.replace("0.000000 10.000000 ylo yhi", "10.0 0.0 ylo yhi");
        assert!(matches!(
            InitialConfig::parse(&text),
            Err(DataError::Parse { line: 7, .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let text = SAMPLE.replace("3 1 10.0", "2 1 10.0");
        let err = InitialConfig::parse(&text).unwrap_err();
        assert!(err.to_string().contains("duplicate atom id 2"));
    }

    #[test]
    fn far_outside_coordinates_are_rejected() {
        for far in ["1e20", "-1e12", "20.5"] {
            let text = SAMPLE.replace("1 1 1.0 2.0 3.0", &format!("1 1 {} 2.0 3.0", far));
            match InitialConfig::parse(&text).unwrap_err() {
                DataError::Parse { line, details } => {
                    assert_eq!(line, 17);
                    assert!(details.contains("outside"), "{}", details);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn one_image_away_still_wraps() {
        let text = SAMPLE.replace("1 1 1.0 2.0 3.0", "1 1 -9.5 19.0 3.0");
        let config = InitialConfig::parse(&text).unwrap();
        let [x, y, _] = config.atoms[0].position;
        assert!((x - 0.5).abs() < 1e-12);
        assert!((y - 9.0).abs() < 1e-12);
        assert_eq!(wrap(-1e-300, [0.0, 10.0]), Some(0.0));
    }

    #[test]
    fn mismatched_bound_labels_are_rejected() {
        let text = SAMPLE.replace("0.000000 10.000000 xlo xhi", "0.000000 10.000000 xlo yhi");
        match InitialConfig::parse(&text).unwrap_err() {
            DataError::Parse { line, details } => {
                assert_eq!(line, 6);
                assert!(details.contains("'xhi'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn repeated_mass_rows_are_rejected() {
        let text = SAMPLE.replace("2 92.90638\n", "2 92.90638\n1 12.0\n");
        match InitialConfig::parse(&text).unwrap_err() {
            DataError::Parse { line, details } => {
                assert_eq!(line, 14);
                assert!(details.contains("duplicate mass for atom type 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn velocities_follow_atom_ids() {
        let text = format!("{}\nVelocities\n\n3 0.3 0.0 0.0\n1 0.1 0.0 0.0\n2 0.2 0.0 0.0\n", SAMPLE);
        let config = InitialConfig::parse(&text).unwrap();
        let v = config.velocities.unwrap();
        assert_eq!(v[0][0], 0.1);
        assert_eq!(v[1][0], 0.2);
        assert_eq!(v[2][0], 0.3);
    }

    #[test]
    fn missing_atoms_section_is_rejected() {
        let text = "title\n\n0 atoms\n1 atom types\n0 1 xlo xhi\n0 1 ylo yhi\n0 1 zlo zhi\n\nMasses\n\n1 1.0\n";
        assert!(matches!(
            InitialConfig::parse(text),
            Err(DataError::Inconsistent(_))
        ));
    }
}
