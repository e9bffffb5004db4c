#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use qadmm_core::math::Scalar;
use qadmm_core::options::AdmmParameters;
use qadmm_core::problem::ProblemModel;
use qadmm_core::solution::AdmmResult;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// On-disk problem: the model plus optional solver parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonProblem {
    pub model: ProblemModel<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<AdmmParameters<Scalar>>,
}

pub fn parse_json_problem(contents: &str) -> Result<JsonProblem> {
    match serde_json::from_str::<JsonProblem>(contents) {
        Ok(problem) => Ok(problem),
        Err(parse_err) => {
            if serde_json::from_str::<AdmmResult<Scalar>>(contents).is_ok() {
                Err(anyhow!(
                    "JSON file contains a solver result, expected a problem with a 'model' field"
                ))
            } else {
                Err(parse_err).context("failed to parse JSON problem")
            }
        }
    }
}

pub fn read_json_problem<P: AsRef<Path>>(path: P) -> Result<JsonProblem> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .with_context(|| format!("failed to read {:?}", path))?;
    parse_json_problem(&contents)
}

pub fn write_json_problem<P: AsRef<Path>>(path: P, problem: &JsonProblem) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("failed to create {:?}", path.as_ref()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, problem).context("failed to serialise problem")?;
    Ok(())
}

pub fn write_result<P: AsRef<Path>>(path: P, result: &AdmmResult<Scalar>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent directory {:?}", parent))?;
        }
    }

    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, result).context("failed to serialise result")?;
    writer
        .flush()
        .with_context(|| format!("failed to write result into {:?}", path))?;
    Ok(())
}
