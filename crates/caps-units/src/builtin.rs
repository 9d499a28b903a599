//! Pure-Rust unit engine covering the udunits ASCII syntax in common use.
//!
//! Every unit reduces to a scale factor, an additive offset, and integer
//! exponents over the SI base dimensions. Products, quotients and powers
//! drop offsets, so `degC` is affine on its own but `degC/s` is a plain
//! rate.

use std::f64::consts::PI;
use std::iter::Peekable;
use std::str::CharIndices;

use caps_types::status::CAPS_UNITERR;
use caps_types::CapsError;
use tracing::debug;

use crate::system::{Derived, UnitSystem};

const BASE_SYMBOLS: [&str; 7] = ["m", "kg", "s", "A", "K", "mol", "cd"];

type Dims = [i32; 7];

const NONE: Dims = [0; 7];
const LENGTH: Dims = [1, 0, 0, 0, 0, 0, 0];
const MASS: Dims = [0, 1, 0, 0, 0, 0, 0];
const TIME: Dims = [0, 0, 1, 0, 0, 0, 0];
const CURRENT: Dims = [0, 0, 0, 1, 0, 0, 0];
const TEMPERATURE: Dims = [0, 0, 0, 0, 1, 0, 0];
const AMOUNT: Dims = [0, 0, 0, 0, 0, 1, 0];
const LUMINOSITY: Dims = [0, 0, 0, 0, 0, 0, 1];
const AREA: Dims = [2, 0, 0, 0, 0, 0, 0];
const VOLUME: Dims = [3, 0, 0, 0, 0, 0, 0];
const VELOCITY: Dims = [1, 0, -1, 0, 0, 0, 0];
const FREQUENCY: Dims = [0, 0, -1, 0, 0, 0, 0];
const FORCE: Dims = [1, 1, -2, 0, 0, 0, 0];
const PRESSURE: Dims = [-1, 1, -2, 0, 0, 0, 0];
const ENERGY: Dims = [2, 1, -2, 0, 0, 0, 0];
const POWER: Dims = [2, 1, -3, 0, 0, 0, 0];
const CHARGE: Dims = [0, 0, 1, 1, 0, 0, 0];
const VOLTAGE: Dims = [2, 1, -3, -1, 0, 0, 0];
const RESISTANCE: Dims = [2, 1, -3, -2, 0, 0, 0];

/// A parsed unit: `si = value * factor + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scaled {
    factor: f64,
    offset: f64,
    dims: Dims,
}

impl Scaled {
    const fn linear(factor: f64, dims: Dims) -> Self {
        Self {
            factor,
            offset: 0.0,
            dims,
        }
    }

    const fn affine(factor: f64, offset: f64, dims: Dims) -> Self {
        Self {
            factor,
            offset,
            dims,
        }
    }

    fn times(self, other: Scaled) -> Result<Scaled, CapsError> {
        let mut dims = self.dims;
        for (d, o) in dims.iter_mut().zip(other.dims) {
            *d = d.checked_add(o).ok_or_else(exponent_overflow)?;
        }
        Ok(Scaled::linear(self.factor * other.factor, dims))
    }

    fn powi(self, n: i32) -> Result<Scaled, CapsError> {
        let mut dims = self.dims;
        for d in dims.iter_mut() {
            *d = d.checked_mul(n).ok_or_else(exponent_overflow)?;
        }
        Ok(Scaled::linear(self.factor.powi(n), dims))
    }

    fn over(self, other: Scaled) -> Result<Scaled, CapsError> {
        self.times(other.powi(-1)?)
    }

    fn is_dimensionless(&self) -> bool {
        self.dims == NONE
    }

    fn to_si(&self, v: f64) -> f64 {
        v * self.factor + self.offset
    }

    fn from_si(&self, v: f64) -> f64 {
        (v - self.offset) / self.factor
    }

    fn derived(self) -> Derived {
        if self.is_dimensionless() {
            return Derived::Dimensionless(self.factor);
        }
        let symbol = BASE_SYMBOLS
            .iter()
            .zip(self.dims)
            .filter(|(_, p)| *p != 0)
            .map(|(sym, p)| if p == 1 { sym.to_string() } else { format!("{sym}{p}") })
            .collect::<Vec<_>>()
            .join(".");
        if (self.factor - 1.0).abs() <= f64::EPSILON {
            Derived::Units(symbol)
        } else {
            Derived::Units(format!("{} {symbol}", self.factor))
        }
    }
}

fn named(name: &str) -> Option<Scaled> {
    let unit = match name {
        "m" | "meter" | "meters" | "metre" | "metres" => Scaled::linear(1.0, LENGTH),
        "g" | "gram" | "grams" => Scaled::linear(1e-3, MASS),
        "kilogram" | "kilograms" => Scaled::linear(1.0, MASS),
        "s" | "sec" | "second" | "seconds" => Scaled::linear(1.0, TIME),
        "min" | "minute" | "minutes" => Scaled::linear(60.0, TIME),
        "h" | "hr" | "hour" | "hours" => Scaled::linear(3600.0, TIME),
        "d" | "day" | "days" => Scaled::linear(86400.0, TIME),
        "A" | "ampere" | "amp" => Scaled::linear(1.0, CURRENT),
        "K" | "kelvin" => Scaled::linear(1.0, TEMPERATURE),
        "mol" | "mole" => Scaled::linear(1.0, AMOUNT),
        "cd" | "candela" => Scaled::linear(1.0, LUMINOSITY),
        "rad" | "radian" | "radians" => Scaled::linear(1.0, NONE),
        "sr" | "steradian" => Scaled::linear(1.0, NONE),
        "deg" | "degree" | "degrees" | "arc_degree" => Scaled::linear(PI / 180.0, NONE),
        "percent" | "%" => Scaled::linear(0.01, NONE),
        "N" | "newton" => Scaled::linear(1.0, FORCE),
        "Pa" | "pascal" => Scaled::linear(1.0, PRESSURE),
        "J" | "joule" => Scaled::linear(1.0, ENERGY),
        "W" | "watt" => Scaled::linear(1.0, POWER),
        "Hz" | "hertz" => Scaled::linear(1.0, FREQUENCY),
        "C" | "coulomb" => Scaled::linear(1.0, CHARGE),
        "V" | "volt" => Scaled::linear(1.0, VOLTAGE),
        "ohm" => Scaled::linear(1.0, RESISTANCE),
        "ft" | "foot" | "feet" => Scaled::linear(0.3048, LENGTH),
        "in" | "inch" | "inches" => Scaled::linear(0.0254, LENGTH),
        "yd" | "yard" | "yards" => Scaled::linear(0.9144, LENGTH),
        "mi" | "mile" | "miles" => Scaled::linear(1609.344, LENGTH),
        "nmile" | "nautical_mile" => Scaled::linear(1852.0, LENGTH),
        "lb" | "lbm" | "pound" => Scaled::linear(0.45359237, MASS),
        "slug" => Scaled::linear(14.593902937206364, MASS),
        "lbf" | "pound_force" => Scaled::linear(4.4482216152605, FORCE),
        "psi" => Scaled::linear(6894.757293168361, PRESSURE),
        "psf" => Scaled::linear(47.88025898033584, PRESSURE),
        "atm" | "atmosphere" => Scaled::linear(101325.0, PRESSURE),
        "bar" => Scaled::linear(1e5, PRESSURE),
        "knot" | "knots" | "kt" | "kts" => Scaled::linear(1852.0 / 3600.0, VELOCITY),
        "L" | "l" | "liter" | "litre" => Scaled::linear(1e-3, VOLUME),
        "hectare" => Scaled::linear(1e4, AREA),
        "degC" | "celsius" => Scaled::affine(1.0, 273.15, TEMPERATURE),
        "degF" | "fahrenheit" => Scaled::affine(5.0 / 9.0, 459.67 * 5.0 / 9.0, TEMPERATURE),
        "degR" | "rankine" => Scaled::linear(5.0 / 9.0, TEMPERATURE),
        _ => return None,
    };
    Some(unit)
}

/// Longest first, so `da` wins over `d`.
const PREFIXES: [(&str, f64); 21] = [
    ("da", 1e1),
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("µ", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
    ("z", 1e-21),
    ("y", 1e-24),
];

fn lookup(name: &str) -> Option<Scaled> {
    if let Some(unit) = named(name) {
        return Some(unit);
    }
    PREFIXES.iter().find_map(|(prefix, scale)| {
        let rest = name.strip_prefix(prefix)?;
        let unit = named(rest)?;
        (unit.offset == 0.0).then(|| Scaled::linear(unit.factor * scale, unit.dims))
    })
}

fn unit_error(unit: &str, why: impl std::fmt::Display) -> CapsError {
    CapsError::new(CAPS_UNITERR).with_message(format!("'{unit}': {why}"))
}

fn exponent_overflow() -> CapsError {
    CapsError::new(CAPS_UNITERR).with_message("dimension exponent out of range")
}

/// Parenthesis nesting accepted before a unit string is rejected.
const MAX_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Word(String, i32),
    Mul,
    Div,
    Pow,
    Open,
    Close,
    Space,
}

fn is_word_char(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '%'
}

fn read_while(chars: &mut Peekable<CharIndices<'_>>, out: &mut String, pred: impl Fn(char) -> bool) {
    while let Some(&(_, c)) = chars.peek() {
        if !pred(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
}

/// Signed integer starting at the cursor, if one is there.
fn read_exponent(text: &str, chars: &mut Peekable<CharIndices<'_>>) -> Result<Option<i32>, CapsError> {
    let Some(&(start, c)) = chars.peek() else {
        return Ok(None);
    };
    let digits_from = if c == '-' || c == '+' { start + 1 } else { start };
    if !text[digits_from..].starts_with(|d: char| d.is_ascii_digit()) {
        return Ok(None);
    }
    let mut raw = String::new();
    if c == '-' || c == '+' {
        raw.push(c);
        chars.next();
    }
    read_while(chars, &mut raw, |d| d.is_ascii_digit());
    raw.parse()
        .map(Some)
        .map_err(|_| unit_error(text, format!("exponent '{raw}' out of range")))
}

fn read_number(text: &str, chars: &mut Peekable<CharIndices<'_>>) -> Result<f64, CapsError> {
    let mut raw = String::new();
    if let Some(&(_, c)) = chars.peek() {
        if c == '-' || c == '+' {
            raw.push(c);
            chars.next();
        }
    }
    read_while(chars, &mut raw, |c| c.is_ascii_digit());
    if let Some(&(i, '.')) = chars.peek() {
        if text[i + 1..].starts_with(|c: char| c.is_ascii_digit()) {
            raw.push('.');
            chars.next();
            read_while(chars, &mut raw, |c| c.is_ascii_digit());
        }
    }
    if let Some(&(i, e)) = chars.peek() {
        if e == 'e' || e == 'E' {
            let rest = &text[i + 1..];
            let signed = rest.starts_with(|c| c == '-' || c == '+') && rest[1..].starts_with(|c: char| c.is_ascii_digit());
            if signed || rest.starts_with(|c: char| c.is_ascii_digit()) {
                raw.push('e');
                chars.next();
                if let Some(exp) = read_exponent(text, chars)? {
                    raw.push_str(&exp.to_string());
                }
            }
        }
    }
    raw.parse().map_err(|_| unit_error(text, format!("bad number '{raw}'")))
}

fn tokenize(text: &str) -> Result<Vec<Tok>, CapsError> {
    let mut toks = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
                if toks.last() != Some(&Tok::Space) {
                    toks.push(Tok::Space);
                }
            }
            '.' | '·' => {
                chars.next();
                toks.push(Tok::Mul);
            }
            '*' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '*'))) {
                    chars.next();
                    toks.push(Tok::Pow);
                } else {
                    toks.push(Tok::Mul);
                }
            }
            '/' => {
                chars.next();
                toks.push(Tok::Div);
            }
            '^' => {
                chars.next();
                toks.push(Tok::Pow);
            }
            '(' => {
                chars.next();
                toks.push(Tok::Open);
            }
            ')' => {
                chars.next();
                toks.push(Tok::Close);
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                toks.push(Tok::Num(read_number(text, &mut chars)?));
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                read_while(&mut chars, &mut word, is_word_char);
                let exp = read_exponent(text, &mut chars)?.unwrap_or(1);
                toks.push(Tok::Word(word, exp));
            }
            other => return Err(unit_error(text, format!("unexpected '{other}' at {i}"))),
        }
    }
    Ok(toks)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    text: &'a str,
    toks: Vec<Tok>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(&Tok::Space) {
            self.pos += 1;
        }
    }

    fn next_solid(&self) -> Option<&Tok> {
        self.toks[self.pos..].iter().find(|t| **t != Tok::Space)
    }

    fn product(&mut self) -> Result<Scaled, CapsError> {
        self.skip_spaces();
        let mut acc = self.power()?;
        loop {
            self.skip_spaces();
            match self.peek() {
                Some(Tok::Mul) => {
                    self.pos += 1;
                    self.skip_spaces();
                    acc = acc.times(self.power()?)?;
                }
                Some(Tok::Div) => {
                    self.pos += 1;
                    self.skip_spaces();
                    acc = acc.over(self.power()?)?;
                }
                Some(Tok::Num(_) | Tok::Word(..) | Tok::Open) => {
                    acc = acc.times(self.power()?)?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn power(&mut self) -> Result<Scaled, CapsError> {
        let base = self.primary()?;
        if self.next_solid() != Some(&Tok::Pow) {
            return Ok(base);
        }
        self.skip_spaces();
        self.pos += 1;
        self.skip_spaces();
        match self.peek() {
            Some(Tok::Num(n)) if n.fract() == 0.0 && n.abs() <= f64::from(i32::MAX) => {
                let n = *n as i32;
                self.pos += 1;
                base.powi(n)
            }
            _ => Err(unit_error(self.text, "exponent must be an integer")),
        }
    }

    fn primary(&mut self) -> Result<Scaled, CapsError> {
        let tok = self.peek().cloned();
        self.pos += 1;
        match tok {
            Some(Tok::Num(n)) => Ok(Scaled::linear(n, NONE)),
            Some(Tok::Word(name, exp)) => {
                let unit = lookup(&name).ok_or_else(|| unit_error(self.text, format!("unknown unit '{name}'")))?;
                if exp == 1 {
                    Ok(unit)
                } else {
                    unit.powi(exp)
                }
            }
            Some(Tok::Open) => {
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(unit_error(self.text, "parentheses nested too deeply"));
                }
                let inner = self.product()?;
                self.depth -= 1;
                self.skip_spaces();
                if self.peek() != Some(&Tok::Close) {
                    return Err(unit_error(self.text, "unbalanced parentheses"));
                }
                self.pos += 1;
                Ok(inner)
            }
            _ => Err(unit_error(self.text, "expected a unit")),
        }
    }
}

fn parse(text: &str) -> Result<Scaled, CapsError> {
    let toks = tokenize(text)?;
    let mut parser = Parser {
        text,
        toks,
        pos: 0,
        depth: 0,
    };
    let unit = parser.product()?;
    parser.skip_spaces();
    if parser.pos != parser.toks.len() {
        return Err(unit_error(text, "trailing characters"));
    }
    Ok(unit)
}

/// Unit engine used when no native library is loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinUnits;

impl BuiltinUnits {
    pub fn new() -> Self {
        Self
    }
}

impl UnitSystem for BuiltinUnits {
    fn convert(&self, from: &str, value: f64, to: &str) -> Result<f64, CapsError> {
        if from == to {
            self.validate(from)?;
            return Ok(value);
        }
        let (src, dst) = (parse(from)?, parse(to)?);
        if src.dims != dst.dims {
            return Err(CapsError::new(CAPS_UNITERR)
                .with_message(format!("cannot convert '{from}' to '{to}'")));
        }
        Ok(dst.from_si(src.to_si(value)))
    }

    fn multiply(&self, a: &str, b: &str) -> Result<Derived, CapsError> {
        let out = parse(a)?.times(parse(b)?)?.derived();
        debug!(a, b, ?out, "unit multiply");
        Ok(out)
    }

    fn divide(&self, a: &str, b: &str) -> Result<Derived, CapsError> {
        let out = parse(a)?.over(parse(b)?)?.derived();
        debug!(a, b, ?out, "unit divide");
        Ok(out)
    }

    fn invert(&self, unit: &str) -> Result<Derived, CapsError> {
        Ok(parse(unit)?.powi(-1)?.derived())
    }

    fn raise(&self, unit: &str, power: i32) -> Result<Derived, CapsError> {
        Ok(parse(unit)?.powi(power)?.derived())
    }

    fn validate(&self, unit: &str) -> Result<(), CapsError> {
        parse(unit).map(|_| ())
    }
}
