use classgen::ast::*;
use classgen::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldRef, FieldType, MethodAccessFlags,
    MethodDescriptor, MethodRef, Name, UnqualifiedName,
};
use classgen::translate::Error;

fn unqualified(name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(name.to_string()).map_err(Error::MalformedName)
}

fn binary(name: &str) -> Result<BinaryName, Error> {
    BinaryName::from_string(name.to_string()).map_err(Error::MalformedName)
}

/// Declaration of a small class exercising loops, branches, fields, and string concatenation
///
/// ```java
/// public class Counter {
///     private int count;
///
///     public Counter() { }
///
///     public int next() {
///         this.count++;
///         return this.count;
///     }
///
///     public static int sum(int[] values) {
///         int total = 0;
///         for (int i = 0; i < values.length; i++) {
///             total += values[i];
///         }
///         return total;
///     }
///
///     public static String describe(int n) {
///         if (n < 0) {
///             return "negative";
///         } else if (n == 0) {
///             return "zero";
///         }
///         return "positive: " + n;
///     }
///
///     public static float average(int[] values) {
///         return values.length == 0 ? 0.0f : (float) sum(values) / (float) values.length;
///     }
/// }
/// ```
pub fn counter_class(package: &str) -> Result<ClassDecl, Error> {
    let name = binary(&format!("{}/Counter", package))?;
    let int_array = FieldType::array(FieldType::int());

    let count = FieldRef {
        class: name.clone(),
        name: unqualified("count")?,
        descriptor: FieldType::int(),
        is_static: false,
    };
    let this_count = || {
        Expr::new(
            ExprKind::Field {
                object: Box::new(Expr::new(ExprKind::This, FieldType::object(name.clone()))),
                field: count.clone(),
            },
            FieldType::int(),
        )
    };

    let constructor = MethodDecl {
        name: UnqualifiedName::INIT,
        access_flags: MethodAccessFlags::PUBLIC,
        parameters: vec![],
        return_type: None,
        body: Block::default(),
    };

    let next = MethodDecl {
        name: unqualified("next")?,
        access_flags: MethodAccessFlags::PUBLIC,
        parameters: vec![],
        return_type: Some(FieldType::int()),
        body: Block(vec![
            Stmt::Expr(Expr::new(
                ExprKind::Increment {
                    target: Box::new(this_count()),
                    decrement: false,
                    prefix: false,
                },
                FieldType::int(),
            )),
            Stmt::Return(Some(this_count())),
        ]),
    };

    // sum(int[] values): values = 0, total = 1, i = 2
    let values = || Expr::local(LocalId(0), int_array.clone());
    let total = || Expr::local(LocalId(1), FieldType::int());
    let index = || Expr::local(LocalId(2), FieldType::int());
    let length = || Expr::new(ExprKind::ArrayLength(Box::new(values())), FieldType::int());
    let sum_ref = MethodRef::static_method(
        name.clone(),
        unqualified("sum")?,
        MethodDescriptor {
            parameters: vec![int_array.clone()],
            return_type: Some(FieldType::int()),
        },
    );
    let sum = MethodDecl {
        name: sum_ref.name.clone(),
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        parameters: vec![Parameter {
            local: LocalId(0),
            param_type: int_array.clone(),
        }],
        return_type: Some(FieldType::int()),
        body: Block(vec![
            Stmt::LocalDecl {
                local: LocalId(1),
                local_type: FieldType::int(),
                initializer: Some(Expr::int(0)),
            },
            Stmt::For {
                label: None,
                init: vec![Stmt::LocalDecl {
                    local: LocalId(2),
                    local_type: FieldType::int(),
                    initializer: Some(Expr::int(0)),
                }],
                condition: Some(Expr::compare(CompareOp::Lt, index(), length())),
                update: vec![Expr::new(
                    ExprKind::Increment {
                        target: Box::new(index()),
                        decrement: false,
                        prefix: false,
                    },
                    FieldType::int(),
                )],
                body: Box::new(Stmt::Block(Block(vec![Stmt::Expr(Expr::new(
                    ExprKind::CompoundAssign {
                        op: BinaryOp::Add,
                        target: Box::new(total()),
                        value: Box::new(Expr::new(
                            ExprKind::ArrayElement {
                                array: Box::new(values()),
                                index: Box::new(index()),
                            },
                            FieldType::int(),
                        )),
                    },
                    FieldType::int(),
                ))]))),
            },
            Stmt::Return(Some(total())),
        ]),
    };

    // describe(int n): n = 0
    let n = || Expr::local(LocalId(0), FieldType::int());
    let describe = MethodDecl {
        name: unqualified("describe")?,
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        parameters: vec![Parameter {
            local: LocalId(0),
            param_type: FieldType::int(),
        }],
        return_type: Some(FieldType::string()),
        body: Block(vec![
            Stmt::If {
                condition: Expr::compare(CompareOp::Lt, n(), Expr::int(0)),
                then_branch: Box::new(Stmt::Return(Some(Expr::string("negative")))),
                else_branch: Some(Box::new(Stmt::If {
                    condition: Expr::compare(CompareOp::Eq, n(), Expr::int(0)),
                    then_branch: Box::new(Stmt::Return(Some(Expr::string("zero")))),
                    else_branch: None,
                })),
            },
            Stmt::Return(Some(Expr::binary(
                BinaryOp::Add,
                Expr::string("positive: "),
                n(),
                FieldType::string(),
            ))),
        ]),
    };

    // average(int[] values): values = 0
    let to_float = |expr: Expr| Expr::new(ExprKind::Cast(Box::new(expr)), FieldType::float());
    let average = MethodDecl {
        name: unqualified("average")?,
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        parameters: vec![Parameter {
            local: LocalId(0),
            param_type: int_array.clone(),
        }],
        return_type: Some(FieldType::float()),
        body: Block(vec![Stmt::Return(Some(Expr::new(
            ExprKind::Conditional {
                condition: Box::new(Expr::compare(CompareOp::Eq, length(), Expr::int(0))),
                then_value: Box::new(Expr::float(0.0)),
                else_value: Box::new(Expr::binary(
                    BinaryOp::Div,
                    to_float(Expr::new(
                        ExprKind::Call {
                            receiver: None,
                            method: sum_ref.clone(),
                            arguments: vec![values()],
                            via_super: false,
                        },
                        FieldType::int(),
                    )),
                    to_float(length()),
                    FieldType::float(),
                )),
            },
            FieldType::float(),
        )))]),
    };

    Ok(ClassDecl {
        name: name.clone(),
        super_class: BinaryName::OBJECT,
        interfaces: vec![],
        access_flags: ClassAccessFlags::PUBLIC,
        source_file: Some(String::from("Counter.java")),
        fields: vec![FieldDecl {
            name: count.name.clone(),
            field_type: FieldType::int(),
            access_flags: FieldAccessFlags::PRIVATE,
        }],
        methods: vec![constructor, next, sum, describe, average],
    })
}
