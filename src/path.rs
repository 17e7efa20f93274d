// ================================
// src/path.rs - lane path grammar (M / L / C)
// ================================
use nalgebra::Point2;
use std::{fmt, str::FromStr};

use crate::error::{LaneError, Result};

/// One drawing command of the lane grammar, always in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point2<f64>),
    LineTo(Point2<f64>),
    CubicTo {
        ctrl1: Point2<f64>,
        ctrl2: Point2<f64>,
        to: Point2<f64>,
    },
}

impl PathCommand {
    pub fn end_point(&self) -> Point2<f64> {
        match *self {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => p,
            PathCommand::CubicTo { to, .. } => to,
        }
    }

    fn letter(&self) -> char {
        match self {
            PathCommand::MoveTo(_) => 'M',
            PathCommand::LineTo(_) => 'L',
            PathCommand::CubicTo { .. } => 'C',
        }
    }
}

/// Ordered command list. A parsed path always starts with a `MoveTo`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    commands: Vec<PathCommand>,
}

impl Path {
    pub fn from_commands(commands: Vec<PathCommand>) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn first_point(&self) -> Option<Point2<f64>> {
        self.commands.first().map(PathCommand::end_point)
    }

    pub fn last_point(&self) -> Option<Point2<f64>> {
        self.commands.last().map(PathCommand::end_point)
    }

    /// Split at every `MoveTo`, each piece starting with its own `MoveTo`.
    pub fn subpaths(&self) -> Vec<Path> {
        let mut pieces: Vec<Path> = Vec::new();
        for command in &self.commands {
            if matches!(command, PathCommand::MoveTo(_)) || pieces.is_empty() {
                pieces.push(Path {
                    commands: vec![*command],
                });
            } else if let Some(piece) = pieces.last_mut() {
                piece.commands.push(*command);
            }
        }
        pieces
    }

    /// Append `other` after this path's commands.
    pub fn extend(&mut self, other: &Path) {
        self.commands.extend_from_slice(&other.commands);
    }

    /// Serialise back to the grammar, whitespace delimited with explicit letters.
    pub fn to_path_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", command.letter())?;
            match *command {
                PathCommand::MoveTo(p) | PathCommand::LineTo(p) => write!(f, " {} {}", p.x, p.y)?,
                PathCommand::CubicTo { ctrl1, ctrl2, to } => write!(
                    f,
                    " {} {} {} {} {} {}",
                    ctrl1.x, ctrl1.y, ctrl2.x, ctrl2.y, to.x, to.y
                )?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = LaneError;

    fn from_str(s: &str) -> Result<Self> {
        parse_path(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Command(char),
    Number(f64),
}

fn arity(command: char) -> Option<usize> {
    match command.to_ascii_uppercase() {
        'M' | 'L' => Some(2),
        'C' => Some(6),
        _ => None,
    }
}

/// Split the raw string into command letters and numbers.
///
/// Commas and whitespace separate tokens, a `-` always starts a new number
/// (unless it follows an exponent marker) and a second decimal point starts a
/// new number, so `10-5` and `1.5.5` both yield two numbers.
fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == ',' {
            i += 1;
            continue;
        }
        if c.is_ascii_alphabetic() {
            if arity(c).is_none() {
                return Err(LaneError::malformed(
                    tokens.len(),
                    format!("unknown command '{c}'"),
                ));
            }
            tokens.push(Token::Command(c));
            i += 1;
            continue;
        }

        let start = i;
        if c == '-' || c == '+' {
            i += 1;
        }
        let mut seen_dot = false;
        let mut seen_exp = false;
        while i < chars.len() {
            let d = chars[i];
            if d.is_ascii_digit() {
                i += 1;
            } else if d == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                i += 1;
            } else if (d == 'e' || d == 'E') && !seen_exp && i > start {
                seen_exp = true;
                i += 1;
                if i < chars.len() && (chars[i] == '-' || chars[i] == '+') {
                    i += 1;
                }
            } else {
                break;
            }
        }

        let text: String = chars[start..i].iter().collect();
        let value = text.parse::<f64>().map_err(|_| {
            LaneError::malformed(tokens.len(), format!("invalid number '{text}'"))
        })?;
        tokens.push(Token::Number(value));
    }

    Ok(tokens)
}

/// Parse a lane path string into absolute commands.
///
/// Lowercase commands are relative to the current point. Extra coordinate
/// groups after a command repeat it, except that `M`/`m` continue as `L`/`l`.
pub fn parse_path(input: &str) -> Result<Path> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(LaneError::malformed(0, "empty path"));
    }

    let mut commands = Vec::new();
    let mut current: Option<char> = None;
    let mut cursor = Point2::origin();
    let mut i = 0;

    while i < tokens.len() {
        if let Token::Command(c) = tokens[i] {
            current = Some(c);
            i += 1;
        }
        let command = current.ok_or_else(|| {
            LaneError::malformed(i, "path must begin with a command letter")
        })?;

        let n = arity(command).unwrap_or(0);
        let mut operands = [0.0; 6];
        for (k, slot) in operands.iter_mut().take(n).enumerate() {
            match tokens.get(i + k) {
                Some(Token::Number(v)) => *slot = *v,
                _ => {
                    return Err(LaneError::malformed(
                        i + k,
                        format!("command '{command}' expects {n} numbers"),
                    ))
                }
            }
        }
        i += n;

        let origin = if command.is_ascii_lowercase() {
            cursor.coords
        } else {
            nalgebra::Vector2::zeros()
        };
        let at = |k: usize| Point2::new(operands[k], operands[k + 1]) + origin;

        let parsed = match command.to_ascii_uppercase() {
            'M' => PathCommand::MoveTo(at(0)),
            'L' => PathCommand::LineTo(at(0)),
            _ => PathCommand::CubicTo {
                ctrl1: at(0),
                ctrl2: at(2),
                to: at(4),
            },
        };

        if commands.is_empty() && !matches!(parsed, PathCommand::MoveTo(_)) {
            return Err(LaneError::malformed(0, "path must begin with a move-to"));
        }

        cursor = parsed.end_point();
        commands.push(parsed);

        current = match command {
            'M' => Some('L'),
            'm' => Some('l'),
            other => Some(other),
        };
    }

    Ok(Path { commands })
}
