//! # PathBuilder
//!
//! Builds concrete broker request paths for an [`Operation`].
//!
//! ```
//! use paths::{Operation, PathBuilder};
//!
//! let path = PathBuilder::new(Operation::GetBindingLastOperation)
//!     .instance("i-1")
//!     .binding("b-1")
//!     .build()
//!     .unwrap();
//! assert_eq!(path, "/v2/service_instances/i-1/service_bindings/b-1/last_operation");
//! ```

use crate::errors::PathBuilderError;
use crate::osbapi::Operation;

#[derive(Debug, Clone)]
pub struct PathBuilder<'a> {
    operation: Operation,
    instance_id: Option<&'a str>,
    binding_id: Option<&'a str>,
}

impl<'a> PathBuilder<'a> {
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            instance_id: None,
            binding_id: None,
        }
    }

    #[must_use]
    pub fn instance(mut self, instance_id: &'a str) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    #[must_use]
    pub fn binding(mut self, binding_id: &'a str) -> Self {
        self.binding_id = Some(binding_id);
        self
    }

    /// Substitute IDs into the operation's route template
    ///
    /// # Errors
    ///
    /// Returns an error when a required ID is missing, or when an ID is empty or
    /// contains `/`, `?` or `#`.
    pub fn build(&self) -> Result<String, PathBuilderError> {
        let op = self.operation.as_str();
        let mut path = self.operation.route().to_owned();

        if self.operation != Operation::GetCatalog {
            let instance_id = self
                .instance_id
                .ok_or(PathBuilderError::MissingInstanceId(op))?;
            validate_segment(instance_id)?;
            path = path.replace("{instance_id}", instance_id);
        }

        if self.operation.needs_binding_id() {
            let binding_id = self
                .binding_id
                .ok_or(PathBuilderError::MissingBindingId(op))?;
            validate_segment(binding_id)?;
            path = path.replace("{binding_id}", binding_id);
        }

        Ok(path)
    }
}

fn validate_segment(id: &str) -> Result<(), PathBuilderError> {
    if id.is_empty() || id.contains(['/', '?', '#']) {
        return Err(PathBuilderError::InvalidId(id.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osbapi::routes;

    /// Replace `{param}` placeholders so templates can be compared with built paths
    fn fill(template: &str) -> String {
        template
            .replace("{instance_id}", "instance-guid")
            .replace("{binding_id}", "binding-guid")
    }

    #[test]
    fn routes_match_builder_output() {
        let all = [
            Operation::GetCatalog,
            Operation::Provision,
            Operation::Deprovision,
            Operation::GetInstanceLastOperation,
            Operation::Bind,
            Operation::Unbind,
            Operation::GetBinding,
            Operation::GetBindingLastOperation,
        ];
        for op in all {
            let built = PathBuilder::new(op)
                .instance("instance-guid")
                .binding("binding-guid")
                .build()
                .unwrap();
            assert_eq!(built, fill(op.route()), "route mismatch for {op}");
        }
    }

    #[test]
    fn catalog_needs_no_ids() {
        assert_eq!(
            PathBuilder::new(Operation::GetCatalog).build().unwrap(),
            routes::CATALOG
        );
    }

    #[test]
    fn binding_operations_require_binding_id() {
        let err = PathBuilder::new(Operation::Bind)
            .instance("i")
            .build()
            .unwrap_err();
        assert_eq!(err, PathBuilderError::MissingBindingId("bind"));
    }

    #[test]
    fn instance_operations_require_instance_id() {
        let err = PathBuilder::new(Operation::Provision).build().unwrap_err();
        assert_eq!(err, PathBuilderError::MissingInstanceId("provision"));
    }

    #[test]
    fn rejects_ids_that_escape_the_segment() {
        for bad in ["", "a/b", "a?b=c", "a#b"] {
            let err = PathBuilder::new(Operation::Provision)
                .instance(bad)
                .build()
                .unwrap_err();
            assert_eq!(err, PathBuilderError::InvalidId(bad.to_owned()));
        }
    }

    #[test]
    fn write_operations_are_flagged() {
        assert!(Operation::Provision.is_write());
        assert!(Operation::Unbind.is_write());
        assert!(!Operation::GetBinding.is_write());
        assert!(!Operation::GetCatalog.is_write());
    }
}
