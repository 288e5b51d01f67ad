// src/model.rs
//
// NetLogo model file reader.
//
// A model file is a sequence of sections separated by "@#$#@#$#@" lines:
// code, interface widgets, info, shapes, version, preview commands, system
// dynamics, BehaviorSpace experiments, HubNet, link shapes, settings and
// DeltaTick. This reader keeps the sections it does not interpret as raw
// text, parses the widget section into typed widgets, and parses the
// BehaviorSpace section into experiments.
//
// Widget records are line-oriented with positional fields; the layouts here
// follow the on-disk format version 6.x writes.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::bsxml::{self, XmlError};
use crate::experiment::Experiment;
use crate::value::{Datatype, Value};

/// Section delimiter used by the NetLogo file format.
pub const SECTION_DELIMITER: &str = "@#$#@#$#@";

/// Errors from reading a model file.
#[derive(Debug)]
pub enum ModelError {
    Io {
        path: String,
        source: std::io::Error,
    },
    /// A widget record was malformed: missing lines or an unparseable field.
    Widget {
        kind: String,
        field: &'static str,
        message: String,
    },
    /// The BehaviorSpace section was not valid experiment XML.
    Xml(XmlError),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Io { path, source } => {
                write!(f, "error opening file {}: {}", path, source)
            }
            ModelError::Widget {
                kind,
                field,
                message,
            } => write!(f, "malformed {} widget ({}): {}", kind, field, message),
            ModelError::Xml(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<XmlError> for ModelError {
    fn from(e: XmlError) -> Self {
        ModelError::Xml(e)
    }
}

/// Screen placement shared by every widget.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frame {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone)]
pub struct GraphicsWindow {
    pub frame: Frame,
    pub patch_size: f64,
    pub min_pxcor: i32,
    pub max_pxcor: i32,
    pub min_pycor: i32,
    pub max_pycor: i32,
}

#[derive(Debug, Clone)]
pub struct Button {
    pub frame: Frame,
    pub display: String,
    pub code: String,
    pub forever: bool,
}

#[derive(Debug, Clone)]
pub struct Pen {
    pub display: String,
    pub interval: f64,
    pub mode: i32,
    pub colour: i32,
    pub in_legend: bool,
    pub setup_code: String,
    pub update_code: String,
}

#[derive(Debug, Clone)]
pub struct Plot {
    pub frame: Frame,
    pub display: String,
    pub xaxis: String,
    pub yaxis: String,
    pub pens: Vec<Pen>,
}

#[derive(Debug, Clone)]
pub struct TextBox {
    pub frame: Frame,
    pub display: String,
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub frame: Frame,
    pub display: String,
    pub variable: String,
    pub on: bool,
}

#[derive(Debug, Clone)]
pub struct Chooser {
    pub frame: Frame,
    pub display: String,
    pub variable: String,
    pub choices: Vec<String>,
    pub selection: usize,
}

#[derive(Debug, Clone)]
pub struct Slider {
    pub frame: Frame,
    pub display: String,
    pub variable: String,
    /// Minimum as written in the file; may be a reporter, not a number.
    pub minimum: String,
    /// Maximum as written in the file; may be a reporter, not a number.
    pub maximum: String,
    pub default: f64,
    pub step: String,
    pub units: String,
}

#[derive(Debug, Clone)]
pub struct Monitor {
    pub frame: Frame,
    pub display: String,
    pub source: String,
    pub precision: i32,
}

#[derive(Debug, Clone)]
pub struct OutputArea {
    pub frame: Frame,
}

#[derive(Debug, Clone)]
pub struct InputBox {
    pub frame: Frame,
    pub variable: String,
    pub value: String,
    pub multiline: bool,
    pub input_type: String,
}

/// One entry in the model's interface section.
#[derive(Debug, Clone)]
pub enum Widget {
    GraphicsWindow(GraphicsWindow),
    Button(Button),
    Plot(Plot),
    TextBox(TextBox),
    Switch(Switch),
    Chooser(Chooser),
    Slider(Slider),
    Monitor(Monitor),
    OutputArea(OutputArea),
    InputBox(InputBox),
}

/// A named, typed, optionally constrained model parameter, as exposed by a
/// parameter-bearing widget.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub datatype: Datatype,
    pub setting: Value,
    pub constraint: Constraint,
}

/// The constraint a parameter widget declares on its values.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    None,
    /// An ordered, explicit option set (chooser choices, switch states).
    FiniteSet(Vec<String>),
    /// A numeric range; either bound may name another reporter/parameter
    /// instead of carrying a literal.
    Range(RangeBound, RangeBound),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    Literal(f64),
    Named(String),
}

impl RangeBound {
    fn parse(text: &str) -> RangeBound {
        match text.trim().parse::<f64>() {
            Ok(x) => RangeBound::Literal(x),
            Err(_) => RangeBound::Named(text.trim().to_string()),
        }
    }

    /// The bound as it appears in a parameter table cell.
    pub fn cell(&self) -> String {
        match self {
            RangeBound::Literal(x) => format!("{}", x),
            RangeBound::Named(name) => name.clone(),
        }
    }
}

impl Widget {
    /// The parameter this widget declares, if it is parameter-bearing.
    pub fn parameter(&self) -> Option<Parameter> {
        match self {
            Widget::Switch(s) => Some(Parameter {
                name: s.variable.clone(),
                datatype: Datatype::Boolean,
                setting: Value::Bool(s.on),
                constraint: Constraint::FiniteSet(vec![
                    "true".to_string(),
                    "false".to_string(),
                ]),
            }),
            Widget::Slider(s) => Some(Parameter {
                name: s.variable.clone(),
                datatype: Datatype::Numeric,
                setting: Value::Number(s.default),
                constraint: Constraint::Range(
                    RangeBound::parse(&s.minimum),
                    RangeBound::parse(&s.maximum),
                ),
            }),
            Widget::Chooser(c) => Some(Parameter {
                name: c.variable.clone(),
                datatype: Datatype::Categorical,
                setting: Value::Int(c.selection as i64),
                constraint: Constraint::FiniteSet(c.choices.clone()),
            }),
            Widget::InputBox(b) => {
                let numeric = b.input_type == "Number" || b.input_type == "Color";
                Some(Parameter {
                    name: b.variable.clone(),
                    datatype: if numeric {
                        Datatype::Numeric
                    } else {
                        Datatype::String
                    },
                    setting: if numeric {
                        Value::parse_literal(&b.value)
                    } else {
                        Value::Str(b.value.clone())
                    },
                    constraint: Constraint::None,
                })
            }
            _ => None,
        }
    }

    /// Metric (source, label) pairs this widget contributes, if it is
    /// output-bearing. Plot pens strip their `plot ` prefix so the
    /// remaining reporter can be sampled directly.
    pub fn metrics(&self) -> Vec<(String, String)> {
        match self {
            Widget::Monitor(m) => {
                let label = if m.display.is_empty() {
                    m.source.clone()
                } else {
                    m.display.clone()
                };
                vec![(m.source.clone(), label)]
            }
            Widget::Plot(p) => p
                .pens
                .iter()
                .filter_map(|pen| {
                    let code = pen.update_code.trim_matches('"');
                    let source = code.strip_prefix("plot ").unwrap_or(code).to_string();
                    if source.is_empty() {
                        None
                    } else {
                        Some((source, pen.display.trim_matches('"').to_string()))
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A parsed NetLogo model.
#[derive(Debug, Clone)]
pub struct NetlogoModel {
    pub code: String,
    pub widgets: Vec<Widget>,
    pub info: String,
    pub shapes: String,
    pub version: String,
    pub preview: String,
    pub system_dynamics: String,
    pub experiments: Vec<Experiment>,
    pub hubnet: String,
    pub link_shapes: String,
    pub settings: String,
}

impl NetlogoModel {
    /// Read and parse a model file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ModelError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse model text. `file_name` is used in error reports only.
    pub fn parse(text: &str, file_name: &str) -> Result<Self, ModelError> {
        let mut sections: Vec<String> = Vec::new();
        let mut current = String::new();
        for line in text.lines() {
            if line == SECTION_DELIMITER {
                sections.push(std::mem::take(&mut current));
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        sections.push(current);

        let section = |i: usize| sections.get(i).cloned().unwrap_or_default();

        let widgets = parse_widgets(&section(1))?;
        let experiments = bsxml::parse_experiments(&section(7), file_name)?;

        Ok(NetlogoModel {
            code: section(0),
            widgets,
            info: section(2),
            shapes: section(3),
            version: section(4).trim().to_string(),
            preview: section(5),
            system_dynamics: section(6),
            experiments,
            hubnet: section(8),
            link_shapes: section(9),
            settings: section(10),
        })
    }

    /// Parameters declared on the interface, keyed by name.
    pub fn parameters(&self) -> BTreeMap<String, Parameter> {
        self.widgets
            .iter()
            .filter_map(Widget::parameter)
            .map(|p| (p.name.clone(), p))
            .collect()
    }

    /// Metric (source, label) pairs from every output widget.
    pub fn metrics(&self) -> Vec<(String, String)> {
        self.widgets.iter().flat_map(Widget::metrics).collect()
    }

    /// The named BehaviorSpace experiment, if the model declares one.
    pub fn experiment(&self, name: &str) -> Option<&Experiment> {
        self.experiments.iter().find(|e| e.name == name)
    }
}

/// Cursor over one widget block's lines.
struct Fields<'a> {
    kind: &'static str,
    lines: std::slice::Iter<'a, &'a str>,
}

impl<'a> Fields<'a> {
    fn new(kind: &'static str, lines: &'a [&'a str]) -> Self {
        Self {
            kind,
            lines: lines.iter(),
        }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a str, ModelError> {
        self.lines.next().copied().ok_or(ModelError::Widget {
            kind: self.kind.to_string(),
            field,
            message: "unexpected end of widget record".to_string(),
        })
    }

    fn skip(&mut self, n: usize) -> Result<(), ModelError> {
        for _ in 0..n {
            self.next("reserved")?;
        }
        Ok(())
    }

    fn int(&mut self, field: &'static str) -> Result<i32, ModelError> {
        let raw = self.next(field)?;
        raw.trim().parse::<i32>().map_err(|_| ModelError::Widget {
            kind: self.kind.to_string(),
            field,
            message: format!("expected integer, found '{}'", raw),
        })
    }

    fn float(&mut self, field: &'static str) -> Result<f64, ModelError> {
        let raw = self.next(field)?;
        raw.trim().parse::<f64>().map_err(|_| ModelError::Widget {
            kind: self.kind.to_string(),
            field,
            message: format!("expected number, found '{}'", raw),
        })
    }

    fn frame(&mut self) -> Result<Frame, ModelError> {
        Ok(Frame {
            left: self.int("left")?,
            top: self.int("top")?,
            right: self.int("right")?,
            bottom: self.int("bottom")?,
        })
    }

    fn rest(self) -> Vec<&'a str> {
        self.lines.copied().collect()
    }
}

/// Parse the widget section into widgets. Blocks are separated by blank
/// lines; unrecognized block types are reported and skipped.
pub fn parse_widgets(section: &str) -> Result<Vec<Widget>, ModelError> {
    let mut widgets = Vec::new();
    let lines: Vec<&str> = section.lines().collect();
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            if !block.is_empty() {
                blocks.push(std::mem::take(&mut block));
            }
        } else {
            block.push(line);
        }
    }
    if !block.is_empty() {
        blocks.push(block);
    }

    for block in blocks {
        let kind = block[0].trim();
        let fields = &block[1..];
        match kind {
            "GRAPHICS-WINDOW" => widgets.push(parse_graphics_window(fields)?),
            "BUTTON" => widgets.push(parse_button(fields)?),
            "PLOT" => widgets.push(parse_plot(fields)?),
            "TEXTBOX" => widgets.push(parse_textbox(fields)?),
            "SWITCH" => widgets.push(parse_switch(fields)?),
            "CHOOSER" => widgets.push(parse_chooser(fields)?),
            "SLIDER" => widgets.push(parse_slider(fields)?),
            "MONITOR" => widgets.push(parse_monitor(fields)?),
            "OUTPUT" => widgets.push(parse_output_area(fields)?),
            "INPUTBOX" => widgets.push(parse_input_box(fields)?),
            other => {
                eprintln!("Unrecognized widget type: {}", other);
            }
        }
    }
    Ok(widgets)
}

fn parse_graphics_window(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("GRAPHICS-WINDOW", lines);
    let frame = f.frame()?;
    f.skip(2)?;
    let patch_size = f.float("patch-size")?;
    f.skip(1)?;
    let _font_size = f.int("font-size")?;
    f.skip(4)?;
    let _x_wrap = f.next("x-wrap")?;
    let _y_wrap = f.next("y-wrap")?;
    f.skip(1)?;
    let min_pxcor = f.int("min-pxcor")?;
    let max_pxcor = f.int("max-pxcor")?;
    let min_pycor = f.int("min-pycor")?;
    let max_pycor = f.int("max-pycor")?;
    Ok(Widget::GraphicsWindow(GraphicsWindow {
        frame,
        patch_size,
        min_pxcor,
        max_pxcor,
        min_pycor,
        max_pycor,
    }))
}

fn parse_button(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("BUTTON", lines);
    let frame = f.frame()?;
    let display = f.next("display")?.trim().to_string();
    let code = f.next("code")?.trim().to_string();
    let forever = f.next("forever")?.trim() == "T";
    Ok(Widget::Button(Button {
        frame,
        display,
        code,
        forever,
    }))
}

fn parse_plot(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("PLOT", lines);
    let frame = f.frame()?;
    let display = f.next("display")?.trim().to_string();
    let xaxis = f.next("xaxis")?.trim().to_string();
    let yaxis = f.next("yaxis")?.trim().to_string();
    f.float("xmin")?;
    f.float("xmax")?;
    f.float("ymin")?;
    f.float("ymax")?;
    f.next("autoplot")?;
    f.next("legend")?;
    f.next("codes")?;
    let mut pens = Vec::new();
    let rest = f.rest();
    let mut it = rest.iter();
    if let Some(marker) = it.next() {
        if marker.trim() == "PENS" {
            for pen_line in it {
                pens.push(parse_pen(pen_line.trim())?);
            }
        }
    }
    Ok(Widget::Plot(Plot {
        frame,
        display,
        xaxis,
        yaxis,
        pens,
    }))
}

/// Parse one pen line: a quoted display (may contain spaces), interval,
/// mode, colour, legend flag, then two quoted code fragments.
fn parse_pen(line: &str) -> Result<Pen, ModelError> {
    let err = |message: String| ModelError::Widget {
        kind: "PLOT".to_string(),
        field: "pen",
        message,
    };
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Err(err("empty pen line".to_string()));
    }

    let mut display = words[0].to_string();
    let mut i = 1;
    while !display.ends_with('"') {
        let w = words
            .get(i)
            .ok_or_else(|| err(format!("unterminated pen name in '{}'", line)))?;
        display.push(' ');
        display.push_str(w);
        i += 1;
    }

    let take = |idx: usize| -> Result<&str, ModelError> {
        words
            .get(idx)
            .copied()
            .ok_or_else(|| err(format!("truncated pen line '{}'", line)))
    };
    let interval = take(i)?
        .parse::<f64>()
        .map_err(|_| err(format!("bad pen interval in '{}'", line)))?;
    let mode = take(i + 1)?
        .parse::<i32>()
        .map_err(|_| err(format!("bad pen mode in '{}'", line)))?;
    let colour = take(i + 2)?
        .parse::<i32>()
        .map_err(|_| err(format!("bad pen colour in '{}'", line)))?;
    let in_legend = take(i + 3)? == "true";

    let mut setup_code = take(i + 4)?.to_string();
    i += 5;
    while setup_code.ends_with("\\\"") || !setup_code.ends_with('"') {
        let w = words
            .get(i)
            .ok_or_else(|| err(format!("unterminated pen setup code in '{}'", line)))?;
        setup_code.push(' ');
        setup_code.push_str(w);
        i += 1;
    }
    let update_code = words[i..].join(" ");

    Ok(Pen {
        display,
        interval,
        mode,
        colour,
        in_legend,
        setup_code,
        update_code,
    })
}

fn parse_textbox(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("TEXTBOX", lines);
    let frame = f.frame()?;
    let display = f.next("display")?.trim().to_string();
    Ok(Widget::TextBox(TextBox { frame, display }))
}

fn parse_switch(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("SWITCH", lines);
    let frame = f.frame()?;
    let display = f.next("display")?.trim().to_string();
    let variable = f.next("variable")?.trim().to_string();
    // A stored 0 means the switch is on.
    let on = f.next("state")?.trim() == "0";
    Ok(Widget::Switch(Switch {
        frame,
        display,
        variable,
        on,
    }))
}

fn parse_chooser(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("CHOOSER", lines);
    let frame = f.frame()?;
    let display = f.next("display")?.trim().to_string();
    let variable = f.next("variable")?.trim().to_string();
    let choices_line = f.next("choices")?.trim().to_string();
    let choices = split_choices(&choices_line);
    let selection = f.int("selection")? as usize;
    Ok(Widget::Chooser(Chooser {
        frame,
        display,
        variable,
        choices,
        selection,
    }))
}

/// Split a chooser's choice line into tokens, rejoining quoted strings that
/// contain spaces.
fn split_choices(line: &str) -> Vec<String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let mut choices: Vec<String> = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let mut choice = words[i].to_string();
        i += 1;
        while choice.starts_with('"') && !choice.ends_with('"') && i < words.len() {
            choice.push(' ');
            choice.push_str(words[i]);
            i += 1;
        }
        choices.push(choice);
    }
    choices
}

fn parse_slider(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("SLIDER", lines);
    let frame = f.frame()?;
    let display = f.next("display")?.trim().to_string();
    let variable = f.next("variable")?.trim().to_string();
    let minimum = f.next("minimum")?.trim().to_string();
    let maximum = f.next("maximum")?.trim().to_string();
    let default = f.float("default")?;
    let step = f.next("step")?.trim().to_string();
    f.skip(1)?;
    let units = f.next("units")?.trim().to_string();
    Ok(Widget::Slider(Slider {
        frame,
        display,
        variable,
        minimum,
        maximum,
        default,
        step,
        units,
    }))
}

fn parse_monitor(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("MONITOR", lines);
    let frame = f.frame()?;
    let display = f.next("display")?.trim().to_string();
    let source = f.next("source")?.trim().to_string();
    let precision = f.int("precision")?;
    Ok(Widget::Monitor(Monitor {
        frame,
        display,
        source,
        precision,
    }))
}

fn parse_output_area(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("OUTPUT", lines);
    let frame = f.frame()?;
    Ok(Widget::OutputArea(OutputArea { frame }))
}

fn parse_input_box(lines: &[&str]) -> Result<Widget, ModelError> {
    let mut f = Fields::new("INPUTBOX", lines);
    let frame = f.frame()?;
    let variable = f.next("variable")?.trim().to_string();
    let value = f.next("value")?.trim().to_string();
    let multiline = matches!(f.next("multiline")?.trim(), "true" | "1" | "T");
    f.skip(1)?;
    let input_type = f.next("input-type")?.trim().to_string();
    Ok(Widget::InputBox(InputBox {
        frame,
        variable,
        value,
        multiline,
        input_type,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDER_BLOCK: &str = "\
SLIDER
10
10
180
43
population
population
0
100
50.0
1
1
NIL
HORIZONTAL
";

    #[test]
    fn test_parse_slider() {
        let widgets = parse_widgets(SLIDER_BLOCK).unwrap();
        assert_eq!(widgets.len(), 1);
        let p = widgets[0].parameter().expect("slider is a parameter");
        assert_eq!(p.name, "population");
        assert_eq!(p.datatype, Datatype::Numeric);
        assert_eq!(p.setting, Value::Number(50.0));
        assert_eq!(
            p.constraint,
            Constraint::Range(RangeBound::Literal(0.0), RangeBound::Literal(100.0))
        );
    }

    #[test]
    fn test_parse_slider_named_bound() {
        let block = SLIDER_BLOCK.replace("\n100\n", "\nmax-pxcor\n");
        let widgets = parse_widgets(&block).unwrap();
        let p = widgets[0].parameter().unwrap();
        match p.constraint {
            Constraint::Range(RangeBound::Literal(min), RangeBound::Named(max)) => {
                assert_eq!(min, 0.0);
                assert_eq!(max, "max-pxcor");
            }
            other => panic!("unexpected constraint {:?}", other),
        }
    }

    #[test]
    fn test_parse_switch_and_chooser() {
        let section = "\
SWITCH
10
50
180
83
wrap?
wrap?
0
1
-1000

CHOOSER
10
90
180
135
strategy
strategy
\"greedy\" \"random\" \"fair share\"
1
";
        let widgets = parse_widgets(section).unwrap();
        assert_eq!(widgets.len(), 2);

        let sw = widgets[0].parameter().unwrap();
        assert_eq!(sw.datatype, Datatype::Boolean);
        assert_eq!(sw.setting, Value::Bool(true));

        let ch = widgets[1].parameter().unwrap();
        assert_eq!(ch.datatype, Datatype::Categorical);
        assert_eq!(ch.setting, Value::Int(1));
        assert_eq!(
            ch.constraint,
            Constraint::FiniteSet(vec![
                "\"greedy\"".to_string(),
                "\"random\"".to_string(),
                "\"fair share\"".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_plot_pens_as_metrics() {
        let section = "\
PLOT
10
140
300
290
Totals
ticks
count
0.0
10.0
0.0
10.0
true
false
\"\" \"\"
PENS
\"sheep\" 1.0 0 -13345367 true \"\" \"plot count sheep\"
\"wolves\" 1.0 0 -2674135 true \"\" \"plot count wolves\"
";
        let widgets = parse_widgets(section).unwrap();
        let metrics = widgets[0].metrics();
        assert_eq!(
            metrics,
            vec![
                ("count sheep".to_string(), "sheep".to_string()),
                ("count wolves".to_string(), "wolves".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_monitor_metric() {
        let section = "\
MONITOR
10
300
120
345
mean energy
mean [energy] of turtles
2
1
11
";
        let widgets = parse_widgets(section).unwrap();
        let metrics = widgets[0].metrics();
        assert_eq!(metrics[0].0, "mean [energy] of turtles");
        assert_eq!(metrics[0].1, "mean energy");
    }

    #[test]
    fn test_unknown_widget_skipped() {
        let section = "\
HOLOGRAM
1
2
3

SWITCH
10
50
180
83
wrap?
wrap?
1
1
-1000
";
        let widgets = parse_widgets(section).unwrap();
        assert_eq!(widgets.len(), 1);
        assert_eq!(widgets[0].parameter().unwrap().setting, Value::Bool(false));
    }

    #[test]
    fn test_sections_split() {
        let text = format!(
            "to setup end\n{d}\nSWITCH\n1\n2\n3\n4\ns?\ns?\n0\n1\n-1000\n{d}\ninfo\n{d}\nshapes\n{d}\n6.2.0\n{d}\n{d}\n{d}\n{d}\n{d}\n{d}\n{d}\n",
            d = SECTION_DELIMITER
        );
        let model = NetlogoModel::parse(&text, "test.nlogo").unwrap();
        assert_eq!(model.version, "6.2.0");
        assert_eq!(model.widgets.len(), 1);
        assert_eq!(model.parameters().len(), 1);
        assert!(model.experiments.is_empty());
    }
}
