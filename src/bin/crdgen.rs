use kube::CustomResourceExt;
use static_routing_agent::crd::NodeRoutingTable;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&NodeRoutingTable::crd())?);
    Ok(())
}
