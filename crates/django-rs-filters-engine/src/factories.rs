//! Filter set selection for connection fields.

use django_rs_filters_core::FilterResult;

use crate::filterset::{FilterSetDef, FilterSetRegistry, MetaFields};

/// Returns the qualified name of the filter set a connection field filters
/// with.
///
/// A provided filter set is used as is. Otherwise a filter set named
/// `{Object}FilterSet` is synthesised for `model` with the given fields, or
/// reused when an identical one was synthesised before. A different
/// declaration under that name gets a numeric suffix.
pub fn get_filterset_class(
    registry: &mut FilterSetRegistry,
    provided: Option<&str>,
    model: &str,
    fields: MetaFields,
) -> FilterResult<String> {
    if let Some(name) = provided {
        return Ok(registry.definition(name)?.qualified());
    }

    let meta = registry.models().get_model(model)?;
    let base = format!("{}FilterSet", meta.object_name);
    let label = meta.label();

    let mut suffix = 1;
    loop {
        let name = if suffix == 1 { base.clone() } else { format!("{base}{suffix}") };
        let candidate = FilterSetDef::new(&name, &label).with_fields(fields.clone());
        match registry.definition(&name).ok().map(|existing| *existing == candidate) {
            Some(true) => return Ok(name),
            Some(false) => suffix += 1,
            None => {
                tracing::debug!(filterset = %name, model = %label, "Synthesised filter set");
                registry.register(candidate)?;
                return Ok(name);
            }
        }
    }
}
