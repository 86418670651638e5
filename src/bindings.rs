// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Describes how shaders see resources, and tracks the state resources are in.

* [`slot`]: the binding slot model (`(type, binding, space)` identity).
* [`root_signature_desc`] and [`layout`]: what shader reflection hands us, and its validated form
  that every backend builds its native layout from.
* [`bind_group`]: the resources bound to one register space.
* [`usage`] and [`resource_tracking`]: usage states and the tracker that owns them.
*/

pub mod bind_group;
pub mod layout;
pub mod resource_tracking;
pub mod root_signature_desc;
pub mod slot;
pub mod usage;
