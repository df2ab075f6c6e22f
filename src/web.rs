use crate::{dom::Dom, error::DomError};
use tracing::{error, instrument};
use wasm_bindgen::{JsCast, JsValue};

/// A [`Dom`] made of [***Text***](https://developer.mozilla.org/en-US/docs/Web/API/Text) nodes directly inside one container element.
///
/// Nodes are created through the container's owner document. Insertions and detaches only ever touch the container's
/// children, and a node that isn't attached there is left alone on detach.
#[derive(Debug, Clone)]
pub struct WebDom {
	element: web_sys::Element,
	document: web_sys::Document,
}

impl WebDom {
	/// # Errors
	///
	/// Iff `element` has no owner document.
	#[instrument]
	pub fn new_for_element_child_nodes(element: web_sys::Element) -> Result<Self, DomError> {
		let document = element
			.owner_document()
			.ok_or_else(|| DomError::Host("No owner document found for root element.".to_owned()))?;
		Ok(Self { element, document })
	}

	#[must_use]
	pub fn element(&self) -> &web_sys::Element {
		&self.element
	}
}

impl Dom for WebDom {
	type Node = web_sys::Text;

	fn create_text(&mut self, text: &str) -> Result<web_sys::Text, DomError> {
		Ok(self.document.create_text_node(text))
	}

	fn set_text(&mut self, node: &web_sys::Text, text: &str) -> Result<(), DomError> {
		node.set_data(text);
		Ok(())
	}

	fn insert_before(&mut self, node: &web_sys::Text, reference: Option<&web_sys::Text>) -> Result<(), DomError> {
		let reference: Option<&web_sys::Node> = reference.map(AsRef::as_ref);
		self.element.insert_before(node, reference).map(drop).map_err(host_error)
	}

	fn detach(&mut self, node: &web_sys::Text) -> Result<(), DomError> {
		let container: &web_sys::Node = self.element.as_ref();
		if node.parent_node().as_ref() == Some(container) {
			container.remove_child(node).map_err(host_error)?;
		}
		Ok(())
	}
}

fn host_error(error: JsValue) -> DomError {
	let message = match error.dyn_ref::<js_sys::Error>() {
		Some(error) => String::from(error.message()),
		None => format!("{:?}", error),
	};
	error!(message = %message, "DOM operation failed.");
	DomError::Host(message)
}
