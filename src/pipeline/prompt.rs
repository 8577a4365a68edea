
/// Fixed instruction template. The `{context}` and `{query}` placeholders are
/// substituted per query; the instruction text itself never varies, so its
/// contract can be checked independently of any dataset.
pub const PROMPT_TEMPLATE: &str = "\
Eres un asistente de análisis de datos de ventas.

DATOS (tablas y resúmenes derivados del Excel):
{context}

PREGUNTA DEL USUARIO:
{query}

INSTRUCCIONES:
- Si ves el dato exacto en las tablas, responde en **UNA SOLA ORACIÓN**
  en español, clara y corta (por ejemplo: \"En 2023 hubo 496 ventas.\").
- Si no encuentras el dato exacto pero hay información relacionada,
  haz una estimación razonable y aclara en esa misma oración que es
  una estimación.
- Si en las tablas no existe la información necesaria (por ejemplo,
  una columna que no está en el Excel), responde con una sola oración
  amable explicando que no hay datos suficientes.
- NUNCA respondas solo con un número ni con más de una oración.

RESPUESTA (una única oración, tono cordial):";

/// Substitute the retrieved context and user query into the template.
#[inline]
pub fn compose(context: &str, query: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{query}", query)
}
