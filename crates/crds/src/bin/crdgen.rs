//! Prints the NetworkAttachmentDefinition CRD manifest as YAML.

use crds::NetworkAttachmentDefinition;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = NetworkAttachmentDefinition::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
