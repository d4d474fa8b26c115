// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Binding of submitted parameters against a manifest's declarations

use std::collections::BTreeMap;

use crate::artifact::ParamValue;
use crate::errors::DagflowError;
use crate::pipeline::ParameterSpec;

/// Apply defaults, check required parameters and coerce values to their declared types
pub fn bind_parameters(
    specs: &[ParameterSpec],
    supplied: &BTreeMap<String, ParamValue>,
) -> Result<BTreeMap<String, ParamValue>, DagflowError> {
    if let Some(unknown) = supplied.keys().find(|k| !specs.iter().any(|s| &s.name == *k)) {
        return Err(DagflowError::UnexpectedParameter {
            parameter: unknown.clone(),
        });
    }

    let mut bound = BTreeMap::new();
    for spec in specs {
        let value = supplied
            .get(&spec.name)
            .or(spec.default.as_ref())
            .cloned()
            .ok_or_else(|| DagflowError::MissingParameter {
                parameter: spec.name.clone(),
            })?;
        let value = spec
            .data_type
            .coerce_param(value)
            .map_err(|actual| DagflowError::ParameterType {
                parameter: spec.name.clone(),
                expected: spec.data_type,
                actual,
            })?;
        bound.insert(spec.name.clone(), value);
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::DataType;

    fn specs() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec {
                name: "input_data_path".into(),
                data_type: DataType::Dataset,
                default: None,
            },
            ParameterSpec {
                name: "accuracy_threshold".into(),
                data_type: DataType::Float,
                default: Some(ParamValue::Float(0.8)),
            },
        ]
    }

    fn supplied(pairs: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_defaults_and_coercion() {
        let bound = bind_parameters(&specs(), &supplied(&[("input_data_path", "gs://b/data.csv".into())])).unwrap();
        assert_eq!(bound["accuracy_threshold"], ParamValue::Float(0.8));

        let bound = bind_parameters(
            &specs(),
            &supplied(&[("input_data_path", "x".into()), ("accuracy_threshold", ParamValue::Int(1))]),
        )
        .unwrap();
        assert_eq!(bound["accuracy_threshold"], ParamValue::Float(1.0));
    }

    #[test]
    fn test_missing_unexpected_and_mistyped() {
        assert!(matches!(
            bind_parameters(&specs(), &BTreeMap::new()),
            Err(DagflowError::MissingParameter { parameter }) if parameter == "input_data_path"
        ));
        assert!(matches!(
            bind_parameters(&specs(), &supplied(&[("input_data_path", "x".into()), ("bucket", "b".into())])),
            Err(DagflowError::UnexpectedParameter { parameter }) if parameter == "bucket"
        ));
        assert!(matches!(
            bind_parameters(
                &specs(),
                &supplied(&[("input_data_path", "x".into()), ("accuracy_threshold", "high".into())])
            ),
            Err(DagflowError::ParameterType { expected: DataType::Float, .. })
        ));
    }
}
