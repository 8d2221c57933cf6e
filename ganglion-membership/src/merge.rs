// ganglion-membership/src/merge.rs
//
// Cluster-merge policy (spec.md §4.7): reject merging with any member
// that fails node validation. Grounded on
// original_source/merge.go's `mergeDelegate.NotifyMerge` (validates
// every merging member, aborts on the first failure) and utils.go's
// `ValidateNode`/`GetNodeDetails` (requires an `id` tag and
// `role == ganglion-server`).

use ganglion_core::{Error, NodeDetails};

pub fn validate_node(details: &NodeDetails) -> Result<(), Error> {
    if !details.is_ganglion_node() {
        return Err(Error::InvalidNode(format!(
            "member {:?} is missing required id/role tags",
            details.name
        )));
    }
    Ok(())
}

/// Rejects the whole merge if any candidate member fails validation,
/// matching the Go source's all-or-nothing `NotifyMerge` semantics.
pub fn validate_merge(candidates: &[NodeDetails]) -> Result<(), Error> {
    for details in candidates {
        validate_node(details)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ganglion_core::{MemberStatus, ServiceEntry};

    fn valid_node() -> NodeDetails {
        NodeDetails {
            id: "id-1".into(),
            name: "n1".into(),
            role: ganglion_core::node::SERVICE_ROLE.into(),
            data_center: "dc1".into(),
            bootstrap: false,
            address: "127.0.0.1".parse().unwrap(),
            port: 1,
            services: Vec::<ServiceEntry>::new(),
            status: MemberStatus::Alive,
        }
    }

    #[test]
    fn accepts_valid_merge() {
        assert!(validate_merge(&[valid_node()]).is_ok());
    }

    #[test]
    fn rejects_merge_with_one_bad_member() {
        let mut bad = valid_node();
        bad.id.clear();
        assert!(validate_merge(&[valid_node(), bad]).is_err());
    }
}
