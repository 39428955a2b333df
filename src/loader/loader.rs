use std::error::Error;
use std::fmt;
use std::fs;

use regex::Regex;

use crate::cpu::CPUConfig;
use crate::instructions::instructions::{InstrRecord, Program, RegisterType};

// <hex address> <opcode> <dest> <src1> <src2>
const TRACE_LINE_PATTERN: &str = r"^\s*(?:0[xX])?([0-9a-fA-F]+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s*$";

#[derive(Debug)]
pub enum LoadError {
    IOError(String),
    ParseError(String),
    AnalysisError(Vec<String>),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::IOError(msg) => write!(f, "{}", msg),
            LoadError::ParseError(msg) => write!(f, "{}", msg),
            LoadError::AnalysisError(msg_vec) => write!(f, "{}", msg_vec.join("\n")),
        }
    }
}

impl Error for LoadError {}

struct Loader {
    register_count: u16,
    code: Vec<InstrRecord>,
    errors: Vec<String>,
}

impl Loader {
    fn load(&mut self, src: &str) -> Result<(), LoadError> {
        let re = Regex::new(TRACE_LINE_PATTERN)
            .map_err(|err| LoadError::ParseError(format!("Invalid trace pattern: {}", err)))?;

        for (line_index, line) in src.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let line_nr = line_index + 1;
            let captures = match re.captures(line) {
                Some(captures) => captures,
                None => return Err(LoadError::ParseError(
                    format!("Malformed trace line {}: '{}'", line_nr, line.trim()))),
            };

            let addr = u32::from_str_radix(&captures[1], 16)
                .map_err(|err| LoadError::ParseError(
                    format!("Invalid address '{}' at line {}: {}", &captures[1], line_nr, err)))?;
            let op_code = Self::parse_opcode(&captures[2]);

            let sink = self.parse_register(&captures[3], line_nr)?;
            let src1 = self.parse_register(&captures[4], line_nr)?;
            let src2 = self.parse_register(&captures[5], line_nr)?;

            self.code.push(InstrRecord { addr, ..InstrRecord::new(op_code, sink, [src1, src2]) });
        }

        Ok(())
    }

    // The pattern only admits digits, so a failed parse means the value does
    // not fit. Such an opcode is as unknown as any other and runs on class B.
    fn parse_opcode(text: &str) -> i64 {
        text.parse::<i64>().unwrap_or(if text.starts_with('-') { i64::MIN } else { i64::MAX })
    }

    fn parse_integer(text: &str, line_nr: usize) -> Result<i64, LoadError> {
        text.parse::<i64>()
            .map_err(|err| LoadError::ParseError(format!("Invalid integer '{}' at line {}: {}", text, line_nr, err)))
    }

    // -1 means the operand is absent. Anything outside the register file is
    // collected so that all bad lines get reported at once.
    fn parse_register(&mut self, text: &str, line_nr: usize) -> Result<Option<RegisterType>, LoadError> {
        let value = Self::parse_integer(text, line_nr)?;
        if value == -1 {
            return Ok(None);
        }

        if value < 0 || value >= self.register_count as i64 {
            self.errors.push(format!("Register {} out of range [0,{}) at line {}",
                                     value, self.register_count, line_nr));
            return Ok(None);
        }

        Ok(Some(value as RegisterType))
    }
}

pub fn load(cpu_config: &CPUConfig, path: &str) -> Result<Program, LoadError> {
    let input = fs::read_to_string(path)
        .map_err(|err| LoadError::IOError(format!("Error reading file '{}': {}", path, err)))?;
    load_from_string(cpu_config, &input)
}

pub fn load_from_string(cpu_config: &CPUConfig, src: &str) -> Result<Program, LoadError> {
    let mut loader = Loader {
        register_count: cpu_config.register_count,
        code: Vec::new(),
        errors: Vec::new(),
    };

    loader.load(src)?;

    if !loader.errors.is_empty() {
        return Err(LoadError::AnalysisError(loader.errors));
    }

    Ok(Program::new(loader.code))
}
