//! Prints the YAML of every custom resource definition
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::Result;
use controller::crd::{
    CFServiceBinding, CFServiceBroker, CFServiceInstance, CFServiceOffering, CFServicePlan,
};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crds = [
        CFServiceBroker::crd(),
        CFServiceOffering::crd(),
        CFServicePlan::crd(),
        CFServiceInstance::crd(),
        CFServiceBinding::crd(),
    ];
    for crd in &crds {
        print!("---\n{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
