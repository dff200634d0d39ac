// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contract with the remote code-resolution service.

use crate::error::Result;
use crate::types::{Code, CodeGroup, ComponentId, FragmentReference};
use std::future::Future;

/// Translates between codes, component ids and fragment files.
///
/// Implementations never cache mappings; the service may change them at
/// any time. Failures are reported as [`Error::RemoteLookup`] and are not
/// retried by the caller.
///
/// [`Error::RemoteLookup`]: crate::Error::RemoteLookup
pub trait CodeIndex {
    /// Resolve codes to the components they currently match. Codes that
    /// match nothing are left out of the result.
    fn codes_to_component_ids(
        &self,
        model_name: &str,
        codes: &[Code],
    ) -> impl Future<Output = Result<Vec<CodeGroup>>>;

    /// Group component ids by the fragment file holding their geometry.
    fn component_ids_to_fragment_references(
        &self,
        model_name: &str,
        component_ids: &[ComponentId],
    ) -> impl Future<Output = Result<Vec<FragmentReference>>>;

    /// Inverse lookup: the codes whose rules match any of `component_ids`.
    fn component_ids_to_codes(
        &self,
        model_name: &str,
        component_ids: &[ComponentId],
    ) -> impl Future<Output = Result<Vec<Code>>>;
}
