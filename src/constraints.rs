//! Match verified identities against the constraints of a role.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. The request remote address equals the certificate IP address (unless disabled).
//! 2. The instance, app, org and space IDs are allowed by the role, in this order.
//! 3. The request remote address is in one of the role's bound CIDRs.
//!
//! The IP address equality check never considers subnets, those are the job of bound CIDRs.
//! The CIDR check always runs, even when IP address matching is disabled.
use std::net::IpAddr;

use anyhow::Result;
use ipnet::IpNet;

use crate::errors::ConstraintMismatch;
use crate::errors::IpAddressMismatch;
use crate::errors::RemoteAddressNotAllowed;
use crate::models::Role;
use crate::models::VerifiedIdentity;

/// Check `value` is in the `allowed` set, with empty sets allowing everything.
pub fn meets_bound_constraints(value: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|entry| entry == value)
}

/// Check the request remote address is the certificate IP address.
///
/// Remote addresses can carry a `/mask` suffix which is ignored.
/// Remote addresses that do not parse never match.
pub fn matches_ip_address(remote: &str, certificate_ip: IpAddr) -> bool {
    match parse_remote(remote) {
        Some(remote) => remote.to_canonical() == certificate_ip.to_canonical(),
        None => false,
    }
}

/// Check the request remote address is in one of the allowed networks, if any are set.
///
/// Remote addresses that do not parse are never allowed by a non-empty list.
pub fn remote_addr_is_ok(remote: &str, cidrs: &[IpNet]) -> bool {
    if cidrs.is_empty() {
        return true;
    }
    match parse_remote(remote) {
        Some(remote) => {
            let remote = remote.to_canonical();
            cidrs.iter().any(|cidr| cidr.contains(&remote))
        }
        None => false,
    }
}

/// Check the verified identity and request remote address are allowed by the role.
pub fn check_role(role: &Role, identity: &VerifiedIdentity, remote: &str) -> Result<()> {
    if !role.disable_ip_matching && !matches_ip_address(remote, identity.ip_address) {
        anyhow::bail!(IpAddressMismatch {
            certificate: identity.ip_address.to_string(),
            remote: remote.to_string(),
        });
    }

    let bounds = [
        ("instance", &identity.instance_id, &role.bound_instance_ids),
        ("app", &identity.app_id, &role.bound_app_ids),
        ("org", &identity.org_id, &role.bound_org_ids),
        ("space", &identity.space_id, &role.bound_space_ids),
    ];
    for (kind, value, allowed) in bounds {
        if !meets_bound_constraints(value, allowed) {
            anyhow::bail!(ConstraintMismatch {
                allowed: allowed.clone(),
                kind,
                value: value.clone(),
            });
        }
    }

    if !remote_addr_is_ok(remote, &role.bound_cidrs) {
        anyhow::bail!(RemoteAddressNotAllowed {
            allowed: role.bound_cidrs.iter().map(ToString::to_string).collect(),
            remote: remote.to_string(),
        });
    }
    Ok(())
}

fn parse_remote(remote: &str) -> Option<IpAddr> {
    let address = remote.split('/').next().unwrap_or_default();
    address.trim().parse().ok()
}
