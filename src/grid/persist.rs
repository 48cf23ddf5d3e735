//! Text representation of the state of a grid, used to save and resume long adaptive runs.
//!
//! The state is a sequence of tagged sections:
//!
//! ```text
//! [grid]
//! mode cumulant
//! dimensions 1
//! budget 500
//! shape uniform
//! lower 0
//! upper 10
//! [bins]
//! split <importance> <lower...> <upper...> <dimension> <point>
//! leaf <importance> <lower...> <upper...> <statistics...>
//! ...
//! [cross-section]
//! calls <calls> <non-finite calls> <non-zero calls>
//! moments <mean> <m2> <m3> <m4>
//! ```
//!
//! Bins are listed in depth-first preorder, so the two children of every `split` line follow it
//! directly. Numbers are written with the shortest representation that reads back to the same
//! value, which makes a loaded grid generate exactly the same points as the saved one.
use super::bin::{Bin, STATS_SLOTS};
use super::{Grid, GridMode};
use crate::channels::{Density, Side};
use crate::core::estimators::CrossSectionEstimator;
use crate::core::Real;
use std::fmt::{self, Display, Formatter};
use std::io::{BufRead, Write};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while reading the state of a grid.
#[derive(Debug, Error)]
pub enum GridFormatError {
    /// Reading or writing failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A section header is missing.
    #[error("missing section `[{0}]`")]
    MissingSection(&'static str),
    /// A line has the wrong tag or the wrong number of entries.
    #[error("line {line}: expected {expected}")]
    Expected {
        /// Line number, starting at one.
        line: usize,
        /// Description of what was expected.
        expected: &'static str,
    },
    /// An entry could not be parsed as a number.
    #[error("line {line}: `{token}` is not a valid number")]
    Number {
        /// Line number, starting at one.
        line: usize,
        /// The offending entry.
        token: String,
    },
    /// The bins do not form a valid tree.
    #[error("inconsistent bin tree: {0}")]
    Structure(String),
}

struct State<'a, T>(&'a Grid<T>);

fn join<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

impl<T: Real> Display for State<'_, T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let grid = self.0;

        writeln!(f, "[grid]")?;
        writeln!(
            f,
            "mode {}",
            match grid.mode {
                GridMode::Cumulant => "cumulant",
                GridMode::MaxWeight => "max-weight",
            }
        )?;
        writeln!(f, "dimensions {}", grid.dimensions())?;
        writeln!(f, "budget {}", grid.budget)?;

        match grid.shape {
            Density::Uniform => writeln!(f, "shape uniform")?,
            Density::BreitWigner { mass2, mass_width } => {
                writeln!(f, "shape breit-wigner {} {}", mass2, mass_width)?
            }
            Density::PowerLaw { pole, nu, side } => writeln!(
                f,
                "shape power-law {} {} {}",
                pole,
                nu,
                match side {
                    Side::Above => "above",
                    Side::Below => "below",
                    Side::Across => "across",
                }
            )?,
            Density::OnShell { mass2 } => writeln!(f, "shape on-shell {}", mass2)?,
            Density::Degenerate => writeln!(f, "shape degenerate")?,
        }

        writeln!(f, "lower {}", join(&grid.lower))?;
        writeln!(f, "upper {}", join(&grid.upper))?;
        writeln!(f, "[bins]")?;

        let mut stack = vec![0];

        while let Some(index) = stack.pop() {
            let bin = grid.bin(index);

            match (bin.children, bin.split) {
                (Some((left, right)), Some((dim, point))) => {
                    writeln!(
                        f,
                        "split {} {} {} {} {}",
                        bin.importance,
                        join(&bin.lower),
                        join(&bin.upper),
                        dim,
                        point
                    )?;
                    stack.push(right);
                    stack.push(left);
                }
                _ => writeln!(
                    f,
                    "leaf {} {} {} {}",
                    bin.importance,
                    join(&bin.lower),
                    join(&bin.upper),
                    join(&bin.stats)
                )?,
            }
        }

        let (calls, moments) = grid.xsec.parts();
        writeln!(f, "[cross-section]")?;
        writeln!(f, "calls {}", join(&calls))?;
        writeln!(f, "moments {}", join(&moments))
    }
}

/// Non-empty lines split into tokens, together with their line numbers.
struct Cursor {
    lines: Vec<(usize, Vec<String>)>,
    pos: usize,
}

impl Cursor {
    fn new<B: BufRead>(reader: B) -> Result<Self, GridFormatError> {
        let mut lines = Vec::new();

        for (number, line) in reader.lines().enumerate() {
            let tokens: Vec<String> = line?.split_whitespace().map(str::to_string).collect();

            if !tokens.is_empty() {
                lines.push((number + 1, tokens));
            }
        }

        Ok(Self { lines, pos: 0 })
    }

    fn last_line(&self) -> usize {
        self.lines.last().map_or(0, |(line, _)| *line)
    }

    fn advance(&mut self, expected: &'static str) -> Result<(usize, Vec<String>), GridFormatError> {
        let line = self.lines.get(self.pos).cloned().ok_or(GridFormatError::Expected {
            line: self.last_line() + 1,
            expected,
        })?;
        self.pos += 1;
        Ok(line)
    }

    fn section(&mut self, name: &'static str) -> Result<(), GridFormatError> {
        match self.lines.get(self.pos) {
            Some((_, tokens)) if tokens.len() == 1 && tokens[0] == format!("[{}]", name) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(GridFormatError::MissingSection(name)),
        }
    }

    /// Reads a line starting with `tag` and returns the remaining entries.
    fn tagged(
        &mut self,
        tag: &'static str,
        expected: &'static str,
    ) -> Result<(usize, Vec<String>), GridFormatError> {
        let (line, mut tokens) = self.advance(expected)?;

        if tokens[0] != tag {
            return Err(GridFormatError::Expected { line, expected });
        }

        tokens.remove(0);
        Ok((line, tokens))
    }
}

fn number<N: FromStr>(line: usize, token: &str) -> Result<N, GridFormatError> {
    token.parse().map_err(|_| GridFormatError::Number {
        line,
        token: token.to_string(),
    })
}

fn numbers<N: FromStr>(line: usize, tokens: &[String]) -> Result<Vec<N>, GridFormatError> {
    tokens.iter().map(|token| number(line, token)).collect()
}

fn read_shape<T: Real>(line: usize, tokens: &[String]) -> Result<Density<T>, GridFormatError> {
    let expected = GridFormatError::Expected {
        line,
        expected: "a shape",
    };

    let shape = match (tokens.first().map(String::as_str), tokens.len()) {
        (Some("uniform"), 1) => Density::Uniform,
        (Some("breit-wigner"), 3) => Density::BreitWigner {
            mass2: number(line, &tokens[1])?,
            mass_width: number(line, &tokens[2])?,
        },
        (Some("power-law"), 4) => Density::PowerLaw {
            pole: number(line, &tokens[1])?,
            nu: number(line, &tokens[2])?,
            side: match tokens[3].as_str() {
                "above" => Side::Above,
                "below" => Side::Below,
                "across" => Side::Across,
                _ => return Err(expected),
            },
        },
        (Some("on-shell"), 2) => Density::OnShell {
            mass2: number(line, &tokens[1])?,
        },
        (Some("degenerate"), 1) => Density::Degenerate,
        _ => return Err(expected),
    };

    Ok(shape)
}

/// Reads the bin at the cursor together with all its descendants and returns its index.
fn read_bin<T: Real>(
    cursor: &mut Cursor,
    dimensions: usize,
    parent: Option<usize>,
    depth: usize,
    bins: &mut Vec<Option<Bin<T>>>,
) -> Result<usize, GridFormatError> {
    const EXPECTED: &str = "a `split` or `leaf` line";

    let (line, tokens) = cursor.advance(EXPECTED)?;
    let d = dimensions;
    let is_split = match (tokens[0].as_str(), tokens.len()) {
        ("split", n) if n == 2 * d + 4 => true,
        ("leaf", n) if n == 2 * d + 2 + STATS_SLOTS * d => false,
        _ => {
            return Err(GridFormatError::Expected {
                line,
                expected: EXPECTED,
            })
        }
    };

    let index = bins.len();
    let stats = if is_split {
        vec![T::zero(); STATS_SLOTS * d]
    } else {
        numbers(line, &tokens[2 * d + 2..])?
    };

    bins.push(Some(Bin {
        lower: numbers(line, &tokens[2..d + 2])?,
        upper: numbers(line, &tokens[d + 2..2 * d + 2])?,
        importance: number(line, &tokens[1])?,
        depth,
        parent,
        children: None,
        split: None,
        stats,
    }));

    if is_split {
        let dim: usize = number(line, &tokens[2 * d + 2])?;
        let point: T = number(line, &tokens[2 * d + 3])?;

        if dim >= d {
            return Err(GridFormatError::Structure(format!(
                "bin in line {} is split along dimension {}",
                line, dim
            )));
        }

        let left = read_bin(cursor, d, Some(index), depth + 1, bins)?;
        let right = read_bin(cursor, d, Some(index), depth + 1, bins)?;

        let tiles = match (&bins[index], &bins[left], &bins[right]) {
            (Some(bin), Some(l), Some(r)) => {
                l.lower == bin.lower
                    && r.upper == bin.upper
                    && l.upper[dim] == point
                    && r.lower[dim] == point
                    && (0..d).all(|i| i == dim || (l.upper[i] == bin.upper[i] && r.lower[i] == bin.lower[i]))
            }
            _ => false,
        };

        if !tiles {
            return Err(GridFormatError::Structure(format!(
                "the children of the bin in line {} do not tile it",
                line
            )));
        }

        if let Some(bin) = bins[index].as_mut() {
            bin.children = Some((left, right));
            bin.split = Some((dim, point));
        }
    }

    Ok(index)
}

impl<T: Real> Grid<T> {
    /// Writes the state of this grid to `writer`.
    pub fn write_state<W: Write>(&self, mut writer: W) -> Result<(), GridFormatError> {
        write!(writer, "{}", State(self))?;
        Ok(())
    }

    /// Returns the state of this grid as a string.
    pub fn to_state_string(&self) -> String {
        State(self).to_string()
    }

    /// Reads a grid from a state written by `write_state`. The loaded grid has no registered
    /// views and no current point.
    pub fn read_state<B: BufRead>(reader: B) -> Result<Self, GridFormatError> {
        let mut cursor = Cursor::new(reader)?;

        cursor.section("grid")?;

        let (line, tokens) = cursor.tagged("mode", "the grid mode")?;
        let mode = match tokens.first().map(String::as_str) {
            Some("cumulant") => GridMode::Cumulant,
            Some("max-weight") => GridMode::MaxWeight,
            _ => {
                return Err(GridFormatError::Expected {
                    line,
                    expected: "`cumulant` or `max-weight`",
                })
            }
        };

        let (line, tokens) = cursor.tagged("dimensions", "the number of dimensions")?;
        let dimensions: usize = number(line, tokens.first().map_or("", String::as_str))?;
        let (line, tokens) = cursor.tagged("budget", "the bin budget")?;
        let budget: usize = number(line, tokens.first().map_or("", String::as_str))?;
        let (line, tokens) = cursor.tagged("shape", "the shape")?;
        let shape = read_shape(line, &tokens)?;
        let (line, tokens) = cursor.tagged("lower", "the lower corner")?;
        let lower: Vec<T> = numbers(line, &tokens)?;
        let (line, tokens) = cursor.tagged("upper", "the upper corner")?;
        let upper: Vec<T> = numbers(line, &tokens)?;

        if dimensions == 0 || budget == 0 || lower.len() != dimensions || upper.len() != dimensions
        {
            return Err(GridFormatError::Structure(
                "the domain does not match the number of dimensions".to_string(),
            ));
        }

        cursor.section("bins")?;

        let mut bins = Vec::new();
        read_bin(&mut cursor, dimensions, None, 0, &mut bins)?;

        let leaves = bins.iter().flatten().filter(|bin| bin.is_leaf()).count();

        match &bins[0] {
            Some(root) if root.lower == lower && root.upper == upper => {}
            _ => {
                return Err(GridFormatError::Structure(
                    "the root does not span the domain".to_string(),
                ))
            }
        }

        cursor.section("cross-section")?;

        let (line, tokens) = cursor.tagged("calls", "the call counters")?;
        let calls: Vec<usize> = numbers(line, &tokens)?;
        let (line2, tokens) = cursor.tagged("moments", "the moments")?;
        let moments: Vec<T> = numbers(line2, &tokens)?;

        let xsec = match (calls.as_slice(), moments.as_slice()) {
            (&[a, b, c], &[m1, m2, m3, m4]) => {
                CrossSectionEstimator::from_parts([a, b, c], [m1, m2, m3, m4])
            }
            _ => {
                return Err(GridFormatError::Expected {
                    line,
                    expected: "three call counters and four moments",
                })
            }
        };

        let mut grid = Self::with_density(shape, lower, upper, budget, mode);
        grid.bins = bins;
        grid.leaves = leaves;
        grid.xsec = xsec;

        Ok(grid)
    }

    /// Reads a grid from the string `state`.
    pub fn from_state_str(state: &str) -> Result<Self, GridFormatError> {
        Self::read_state(state.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Channel, Resonance, Shape};
    use rand_pcg::Pcg64;

    fn trained_grid(mode: GridMode) -> (Grid<f64>, Pcg64) {
        let mut rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);
        let mut grid = Grid::<f64>::new(vec![0.0, 0.0], vec![1.0, 2.0], 40, mode);

        for i in 0..8_000 {
            let weight = grid.generate(&mut rng).unwrap();
            let x = grid.point().to_vec();
            grid.update(weight * (x[0] - 0.3).abs() * x[1]);

            if i % 100 == 99 {
                grid.adapt();
            }
        }

        (grid, rng)
    }

    #[test]
    fn test_state_round_trip() {
        let (grid, _) = trained_grid(GridMode::MaxWeight);
        let state = grid.to_state_string();
        let loaded = Grid::<f64>::from_state_str(&state).unwrap();

        assert_eq!(loaded.to_state_string(), state);
        assert_eq!(loaded.leaf_count(), grid.leaf_count());
        assert_eq!(loaded.cross_section(), grid.cross_section());
        assert_eq!(loaded.views(), 0);
    }

    #[test]
    fn test_replay_after_loading() {
        let (mut grid, rng) = trained_grid(GridMode::Cumulant);
        let mut loaded = Grid::<f64>::from_state_str(&grid.to_state_string()).unwrap();

        let mut rng_a = rng.clone();
        let mut rng_b = rng;

        for _ in 0..1000 {
            assert_eq!(grid.generate(&mut rng_a), loaded.generate(&mut rng_b));
            assert_eq!(grid.point(), loaded.point());
        }
    }

    #[test]
    fn test_shaped_round_trip() {
        let channel = Channel::new(
            Shape::PowerLaw { nu: 0.5 },
            Resonance::stable(2.0),
            1.0,
            10.0,
        );
        let grid = Grid::with_shape(&channel, 10, GridMode::Cumulant).unwrap();
        let state = grid.to_state_string();

        assert!(state.contains("shape power-law 4 0.5 across"));
        assert_eq!(
            Grid::<f64>::from_state_str(&state).unwrap().shape(),
            grid.shape()
        );
    }

    #[test]
    fn test_errors() {
        let state = Grid::<f64>::new(vec![0.0], vec![1.0], 4, GridMode::Cumulant).to_state_string();

        assert!(matches!(
            Grid::<f64>::from_state_str(""),
            Err(GridFormatError::MissingSection("grid"))
        ));
        assert!(matches!(
            Grid::<f64>::from_state_str(&state.replace("budget 4", "budget four")),
            Err(GridFormatError::Number { line: 4, .. })
        ));
        assert!(matches!(
            Grid::<f64>::from_state_str(&state.replace("[cross-section]", "")),
            Err(GridFormatError::MissingSection("cross-section"))
        ));
        assert!(matches!(
            Grid::<f64>::from_state_str(&state.replace("leaf 1 0 1", "leaf 1 0 2")),
            Err(GridFormatError::Structure(_))
        ));
    }
}
