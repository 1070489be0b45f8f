use std::str::FromStr;

use knuffel::ast::Literal;
use knuffel::errors::DecodeError;
use knuffel::span::Spanned;
use miette::miette;

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct Output {
    #[knuffel(argument)]
    pub name: String,
    #[knuffel(child, unwrap(argument))]
    pub scale: Option<Scale>,
    #[knuffel(child)]
    pub position: Option<Position>,
    #[knuffel(child, unwrap(argument, str))]
    pub mode: Option<Mode>,
}

/// Output scale, written as an integer or a decimal up to 10.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale(pub f64);

impl Scale {
    const MAX: f64 = 10.;
}

impl<S: knuffel::traits::ErrorSpan> knuffel::DecodeScalar<S> for Scale {
    fn type_check(
        type_name: &Option<Spanned<knuffel::ast::TypeName, S>>,
        ctx: &mut knuffel::decode::Context<S>,
    ) {
        if let Some(type_name) = type_name {
            ctx.emit_error(DecodeError::unexpected(
                type_name,
                "type name",
                "no type name expected for this node",
            ));
        }
    }

    fn raw_decode(
        val: &Spanned<Literal, S>,
        _ctx: &mut knuffel::decode::Context<S>,
    ) -> Result<Self, DecodeError<S>> {
        let scale = match &**val {
            Literal::Int(value) => {
                f64::from(i32::try_from(value).map_err(|e| DecodeError::conversion(val, e))?)
            }
            Literal::Decimal(value) => {
                f64::try_from(value).map_err(|e| DecodeError::conversion(val, e))?
            }
            _ => return Err(DecodeError::scalar_kind(knuffel::decode::Kind::Decimal, val)),
        };

        if scale > 0. && scale <= Self::MAX {
            Ok(Self(scale))
        } else {
            Err(DecodeError::conversion(
                val,
                format!("scale must be above 0 and at most {}", Self::MAX),
            ))
        }
    }
}

#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    #[knuffel(property)]
    pub x: i32,
    #[knuffel(property)]
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub width: u16,
    pub height: u16,
}

impl FromStr for Mode {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((width, height)) = s.split_once('x') else {
            return Err(miette!("no 'x' separator found"));
        };

        let width = width
            .parse()
            .map_err(|_| miette!("error parsing width"))?;
        let height = height
            .parse()
            .map_err(|_| miette!("error parsing height"))?;

        Ok(Self { width, height })
    }
}

impl Output {
    pub fn scale(&self) -> f64 {
        self.scale.map_or(1., |scale| scale.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_scale_is_rejected() {
        let res = crate::Config::parse(
            "test.kdl",
            r#"
            output "virtual-1" {
                scale 0
            }
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn parse_mode() {
        assert_eq!(
            "1920x1080".parse::<Mode>().unwrap(),
            Mode {
                width: 1920,
                height: 1080,
            }
        );
        assert!("1920".parse::<Mode>().is_err());
        assert!("axb".parse::<Mode>().is_err());
    }
}
