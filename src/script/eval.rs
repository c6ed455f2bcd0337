use std::collections::HashMap;

use crate::draw::{FillStyle, Style};
use crate::foundation::core::{Canvas, Point, Rgba8};
use crate::script::ast::{Arg, BinaryOp, Call, Expr, Stmt};
use crate::script::builder::{DEFAULT_BEND, DEFAULT_TEXT_SIZE, SketchBuilder};
use crate::script::error::ScriptError;

const MATH_FUNCS: &[&str] = &[
    "min", "max", "abs", "sqrt", "sin", "cos", "round", "floor", "ceil",
];
const SHAPE_STYLE_ARGS: &[&str] = &["stroke", "fill", "stroke_width", "roughness", "fill_style"];
const CURVE_ARGS: &[&str] = &[
    "stroke",
    "fill",
    "stroke_width",
    "roughness",
    "fill_style",
    "bend",
];
const TEXT_ARGS: &[&str] = &["size", "color"];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Num(f64),
    Str(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Num(_) => "number",
            Self::Str(_) => "string",
        }
    }

    fn into_text(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Num(v) => format_number(v),
        }
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Evaluates parsed step code, feeding drawing calls to a [`SketchBuilder`].
pub(crate) struct Interpreter<'b> {
    env: HashMap<String, Value>,
    builder: &'b mut SketchBuilder,
}

impl<'b> Interpreter<'b> {
    pub(crate) fn new(canvas: Canvas, builder: &'b mut SketchBuilder) -> Self {
        let mut env = HashMap::new();
        env.insert("width".to_owned(), Value::Num(f64::from(canvas.width)));
        env.insert("height".to_owned(), Value::Num(f64::from(canvas.height)));
        Self { env, builder }
    }

    pub(crate) fn run(&mut self, stmts: &[Stmt]) -> Result<(), ScriptError> {
        for stmt in stmts {
            match stmt {
                Stmt::Let { name, value, offset } => {
                    if MATH_FUNCS.contains(&name.as_str()) || is_primitive(name) {
                        return Err(ScriptError::new(
                            *offset,
                            format!("'{name}' is a built-in name and cannot be rebound"),
                        ));
                    }
                    let v = self.eval(value)?;
                    self.env.insert(name.clone(), v);
                }
                Stmt::Draw(call) => self.draw(call)?,
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Num(v) => Ok(Value::Num(*v)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Var { name, offset } => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::new(*offset, format!("unknown variable '{name}'"))),
            Expr::Neg { expr, offset } => {
                let v = self.eval_num(expr, *offset)?;
                Ok(Value::Num(-v))
            }
            Expr::Binary {
                op,
                left,
                right,
                offset,
            } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(*op, l, r, *offset)
            }
            Expr::Call(call) => self.math(call),
        }
    }

    fn eval_num(&self, expr: &Expr, offset: usize) -> Result<f64, ScriptError> {
        match self.eval(expr)? {
            Value::Num(v) => Ok(v),
            other => Err(ScriptError::new(
                offset,
                format!("expected a number, got {}", other.type_name()),
            )),
        }
    }

    fn math(&self, call: &Call) -> Result<Value, ScriptError> {
        let name = call.func.as_str();
        if !MATH_FUNCS.contains(&name) {
            let msg = if is_primitive(name) {
                format!("'{name}' draws and cannot be used inside an expression")
            } else {
                format!("unknown function '{name}'")
            };
            return Err(ScriptError::new(call.offset, msg));
        }
        let mut xs = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            if arg.name.is_some() {
                return Err(ScriptError::new(
                    arg.offset,
                    format!("'{name}' takes no named arguments"),
                ));
            }
            xs.push(self.eval_num(&arg.value, arg.offset)?);
        }

        let v = match name {
            "min" | "max" => {
                if xs.is_empty() {
                    return Err(ScriptError::new(
                        call.offset,
                        format!("'{name}' expects at least 1 argument"),
                    ));
                }
                let pick: fn(f64, f64) -> f64 = if name == "min" { f64::min } else { f64::max };
                xs.iter().copied().fold(xs[0], pick)
            }
            _ => {
                let &[x] = xs.as_slice() else {
                    return Err(ScriptError::new(
                        call.offset,
                        format!("'{name}' expects 1 argument, got {}", xs.len()),
                    ));
                };
                match name {
                    "abs" => x.abs(),
                    "sqrt" => x.sqrt(),
                    "sin" => x.sin(),
                    "cos" => x.cos(),
                    "round" => x.round(),
                    "floor" => x.floor(),
                    _ => x.ceil(),
                }
            }
        };
        Ok(Value::Num(v))
    }

    fn draw(&mut self, call: &Call) -> Result<(), ScriptError> {
        let mut args = Args::split(self, call)?;
        match call.func.as_str() {
            "rect" => {
                let [x, y, w, h] = args.numbers(call)?;
                let style = args.style(SHAPE_STYLE_ARGS)?;
                self.builder.rect(x, y, w, h, style);
            }
            "square" => {
                let [x, y, size] = args.numbers(call)?;
                let style = args.style(SHAPE_STYLE_ARGS)?;
                self.builder.square(x, y, size, style);
            }
            "circle" => {
                let [cx, cy, d] = args.numbers(call)?;
                let style = args.style(SHAPE_STYLE_ARGS)?;
                self.builder.circle(cx, cy, d, style);
            }
            "ellipse" => {
                let [cx, cy, w, h] = args.numbers(call)?;
                let style = args.style(SHAPE_STYLE_ARGS)?;
                self.builder.ellipse(cx, cy, w, h, style);
            }
            "line" => {
                let [x1, y1, x2, y2] = args.numbers(call)?;
                let style = args.style(SHAPE_STYLE_ARGS)?;
                self.builder.line(x1, y1, x2, y2, style);
            }
            "arrow" => {
                let [x1, y1, x2, y2] = args.numbers(call)?;
                let style = args.style(SHAPE_STYLE_ARGS)?;
                self.builder.arrow(x1, y1, x2, y2, style);
            }
            "curve" => {
                let [x1, y1, x2, y2] = args.numbers(call)?;
                let bend = args.named_number("bend")?.unwrap_or(DEFAULT_BEND);
                let style = args.style(CURVE_ARGS)?;
                self.builder.curve((x1, y1), (x2, y2), bend, style);
            }
            "polygon" => {
                let coords = args.all_numbers()?;
                if coords.len() < 6 || coords.len() % 2 != 0 {
                    return Err(ScriptError::new(
                        call.offset,
                        format!(
                            "'polygon' expects an even number of coordinates for at least 3 points, got {}",
                            coords.len()
                        ),
                    ));
                }
                let points = coords
                    .chunks_exact(2)
                    .map(|xy| Point::new(xy[0], xy[1]))
                    .collect();
                let style = args.style(SHAPE_STYLE_ARGS)?;
                self.builder.polygon(points, style);
            }
            "text" => {
                if args.positional.len() != 3 {
                    return Err(ScriptError::new(
                        call.offset,
                        format!(
                            "'text' expects 3 arguments (text, x, y), got {}",
                            args.positional.len()
                        ),
                    ));
                }
                let (label, _) = args.positional.remove(0);
                let [x, y] = args.numbers(call)?;
                args.check_allowed(TEXT_ARGS)?;
                let size = args.named_number("size")?.unwrap_or(DEFAULT_TEXT_SIZE);
                let color = args.named_color("color")?.unwrap_or(Rgba8::INK);
                self.builder.text(label.into_text(), x, y, size, color);
            }
            other if MATH_FUNCS.contains(&other) => {
                return Err(ScriptError::new(
                    call.offset,
                    format!("'{other}' computes a value and cannot be a statement"),
                ));
            }
            other => {
                return Err(ScriptError::new(
                    call.offset,
                    format!("unknown primitive '{other}'"),
                ));
            }
        }
        Ok(())
    }
}

fn is_primitive(name: &str) -> bool {
    matches!(
        name,
        "rect" | "square" | "circle" | "ellipse" | "line" | "polygon" | "arrow" | "curve" | "text"
    )
}

fn binary(op: BinaryOp, l: Value, r: Value, offset: usize) -> Result<Value, ScriptError> {
    match (op, l, r) {
        (BinaryOp::Add, Value::Str(a), b) => Ok(Value::Str(a + &b.into_text())),
        (BinaryOp::Add, a @ Value::Num(_), Value::Str(b)) => {
            Ok(Value::Str(a.into_text() + &b))
        }
        (op, Value::Num(a), Value::Num(b)) => Ok(Value::Num(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
        })),
        (_, l, r) => Err(ScriptError::new(
            offset,
            format!(
                "unsupported operands: {} and {}",
                l.type_name(),
                r.type_name()
            ),
        )),
    }
}

/// Evaluated call arguments, split into positional and named.
struct Args {
    positional: Vec<(Value, usize)>,
    named: Vec<(String, Value, usize)>,
}

impl Args {
    fn split(interp: &Interpreter<'_>, call: &Call) -> Result<Self, ScriptError> {
        let mut positional = Vec::new();
        let mut named: Vec<(String, Value, usize)> = Vec::new();
        for Arg {
            name,
            value,
            offset,
        } in &call.args
        {
            let v = interp.eval(value)?;
            match name {
                Some(name) => {
                    if named.iter().any(|(n, _, _)| n == name) {
                        return Err(ScriptError::new(
                            *offset,
                            format!("duplicate argument '{name}'"),
                        ));
                    }
                    named.push((name.clone(), v, *offset));
                }
                None => {
                    if !named.is_empty() {
                        return Err(ScriptError::new(
                            *offset,
                            "positional argument after named argument",
                        ));
                    }
                    positional.push((v, *offset));
                }
            }
        }
        Ok(Self { positional, named })
    }

    fn numbers<const N: usize>(&self, call: &Call) -> Result<[f64; N], ScriptError> {
        if self.positional.len() != N {
            return Err(ScriptError::new(
                call.offset,
                format!(
                    "'{}' expects {N} positional arguments, got {}",
                    call.func,
                    self.positional.len()
                ),
            ));
        }
        let mut out = [0.0; N];
        for (slot, (v, offset)) in out.iter_mut().zip(&self.positional) {
            *slot = as_number(v, *offset)?;
        }
        Ok(out)
    }

    fn all_numbers(&self) -> Result<Vec<f64>, ScriptError> {
        self.positional
            .iter()
            .map(|(v, offset)| as_number(v, *offset))
            .collect()
    }

    fn check_allowed(&self, allowed: &[&str]) -> Result<(), ScriptError> {
        match self
            .named
            .iter()
            .find(|(n, _, _)| !allowed.contains(&n.as_str()))
        {
            Some((n, _, offset)) => Err(ScriptError::new(
                *offset,
                format!("unknown argument '{n}'"),
            )),
            None => Ok(()),
        }
    }

    fn take(&mut self, key: &str) -> Option<(Value, usize)> {
        let idx = self.named.iter().position(|(n, _, _)| n == key)?;
        let (_, v, offset) = self.named.remove(idx);
        Some((v, offset))
    }

    fn named_number(&mut self, key: &str) -> Result<Option<f64>, ScriptError> {
        self.take(key)
            .map(|(v, offset)| as_number(&v, offset))
            .transpose()
    }

    fn named_string(&mut self, key: &str) -> Result<Option<(String, usize)>, ScriptError> {
        match self.take(key) {
            None => Ok(None),
            Some((Value::Str(s), offset)) => Ok(Some((s, offset))),
            Some((other, offset)) => Err(ScriptError::new(
                offset,
                format!("'{key}' expects a string, got {}", other.type_name()),
            )),
        }
    }

    fn named_color(&mut self, key: &str) -> Result<Option<Rgba8>, ScriptError> {
        let Some((s, offset)) = self.named_string(key)? else {
            return Ok(None);
        };
        Rgba8::parse(&s)
            .map(Some)
            .map_err(|_| ScriptError::new(offset, format!("invalid color '{s}' for '{key}'")))
    }

    fn style(&mut self, allowed: &[&str]) -> Result<Style, ScriptError> {
        self.check_allowed(allowed)?;
        let mut style = Style::default();
        if let Some(stroke) = self.named_color("stroke")? {
            style.stroke = stroke;
        }
        if let Some(fill) = self.named_color("fill")? {
            style.fill = (fill.a > 0).then_some(fill);
        }
        if let Some(w) = self.named_number("stroke_width")? {
            style.stroke_width = w;
        }
        if let Some(r) = self.named_number("roughness")? {
            style.roughness = r;
        }
        if let Some((s, offset)) = self.named_string("fill_style")? {
            style.fill_style = FillStyle::parse(&s).ok_or_else(|| {
                ScriptError::new(
                    offset,
                    format!("fill_style must be \"hachure\" or \"solid\", got '{s}'"),
                )
            })?;
        }
        Ok(style)
    }
}

fn as_number(v: &Value, offset: usize) -> Result<f64, ScriptError> {
    match v {
        Value::Num(n) => Ok(*n),
        other => Err(ScriptError::new(
            offset,
            format!("expected a number, got {}", other.type_name()),
        )),
    }
}
